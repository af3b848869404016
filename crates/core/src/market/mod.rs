pub mod polygon;
pub mod types;

use types::{
    IndicatorQuery, IndicatorSeries, MacdSeries, NewsArticle, ShortInterestRecord, StockBar,
};

/// Seam over the market-data provider. Every operation classifies its outcome
/// itself: `None` means the fetch failed (transport, shape, or an upstream
/// error status) and has already been logged; `Some(empty)` is a valid
/// empty-success terminal state. Failures never propagate past this boundary,
/// so one broken data source cannot abort an aggregation.
#[async_trait::async_trait]
pub trait MarketData: Send + Sync {
    async fn daily_bars(&self, symbol: &str, days: i64) -> Option<Vec<StockBar>>;

    async fn weekly_bars(&self, symbol: &str, weeks: i64) -> Option<Vec<StockBar>>;

    async fn news(&self, symbol: &str, limit: u32) -> Option<Vec<NewsArticle>>;

    async fn short_interest(&self, symbol: &str, limit: u32) -> Option<Vec<ShortInterestRecord>>;

    async fn macd(&self, symbol: &str, query: IndicatorQuery) -> Option<MacdSeries>;

    async fn rsi(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries>;

    async fn ema(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries>;

    async fn sma(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries>;
}
