use crate::config::Settings;
use crate::market::types::{
    IndicatorPoint, IndicatorQuery, IndicatorSeries, MacdPoint, MacdSeries, NewsArticle,
    ShortInterestRecord, StockBar,
};
use crate::market::MarketData;
use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cmp::Reverse;

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
// The short-interest path is uncertain in the upstream docs; keep it
// configurable via POLYGON_SHORT_INTEREST_PATH.
const DEFAULT_SHORT_INTEREST_PATH: &str = "/stocks/v1/short-interest";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct PolygonClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    short_interest_path: String,
}

impl PolygonClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_polygon_api_key()?.to_string();
        let base_url = settings
            .polygon_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let short_interest_path = settings
            .polygon_short_interest_path
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SHORT_INTEREST_PATH.to_string());

        let timeout_secs = settings.polygon_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build polygon http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            short_interest_path,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Fetch + typed parse, classifying transport and shape failures. `None`
    /// has already been logged with the symbol and raw error context.
    async fn get_envelope<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        symbol: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Option<T> {
        let res = match self
            .http
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(query)
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(%symbol, kind, error = %err, "polygon request failed");
                return None;
            }
        };

        let status = res.status();
        let text = match res.text().await {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(%symbol, kind, error = %err, "failed to read polygon response body");
                return None;
            }
        };

        if !status.is_success() {
            tracing::error!(%symbol, kind, %status, body = %text, "polygon returned non-success status");
            return None;
        }

        match serde_json::from_str::<T>(&text) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::error!(%symbol, kind, error = %err, body = %text, "polygon response did not match expected shape");
                None
            }
        }
    }

    async fn fetch_aggregates(
        &self,
        kind: &'static str,
        symbol: &str,
        timespan: &str,
        back_days: i64,
        limit: i64,
    ) -> Option<Vec<StockBar>> {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(back_days);
        let url = self.url(&format!(
            "/v2/aggs/ticker/{symbol}/range/1/{timespan}/{from}/{to}"
        ));
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "desc".to_string()),
            ("limit", limit.to_string()),
        ];

        let env: AggsEnvelope = self.get_envelope(kind, symbol, &url, &query).await?;
        let results = check_results(kind, symbol, env.status, env.message, env.results)?;
        if results.is_empty() {
            tracing::warn!(%symbol, kind, %from, %to, "no aggregate results in successful response");
            return Some(Vec::new());
        }
        Some(bars_from_aggs(results))
    }

    async fn fetch_scalar_indicator(
        &self,
        kind: &'static str,
        indicator: &str,
        symbol: &str,
        query: &IndicatorQuery,
    ) -> Option<IndicatorSeries> {
        let url = self.url(&format!("/v1/indicators/{indicator}/{symbol}"));
        let params = indicator_params(query);

        let env: IndicatorEnvelope = self.get_envelope(kind, symbol, &url, &params).await?;
        let values = check_results(
            kind,
            symbol,
            env.status,
            env.message,
            env.results.and_then(|r| r.values),
        )?;
        if values.is_empty() {
            tracing::warn!(%symbol, kind, "no indicator values in successful response");
        }
        Some(indicator_series_from_values(values))
    }
}

#[async_trait::async_trait]
impl MarketData for PolygonClient {
    async fn daily_bars(&self, symbol: &str, days: i64) -> Option<Vec<StockBar>> {
        self.fetch_aggregates("daily aggregates", symbol, "day", days, days)
            .await
    }

    async fn weekly_bars(&self, symbol: &str, weeks: i64) -> Option<Vec<StockBar>> {
        // Weeks approximated as 7*N calendar days; the provider aligns bars to
        // actual market weeks.
        self.fetch_aggregates("weekly aggregates", symbol, "week", weeks * 7, weeks)
            .await
    }

    async fn news(&self, symbol: &str, limit: u32) -> Option<Vec<NewsArticle>> {
        let url = self.url("/v2/reference/news");
        let query = [
            ("ticker", symbol.to_string()),
            ("limit", limit.to_string()),
            ("order", "desc".to_string()),
            ("sort", "published_utc".to_string()),
        ];

        let env: NewsEnvelope = self.get_envelope("news", symbol, &url, &query).await?;
        let results = check_results("news", symbol, env.status, env.message, env.results)?;
        if results.is_empty() {
            tracing::warn!(%symbol, "no news results in successful response");
            return Some(Vec::new());
        }
        Some(results.into_iter().map(news_from_raw).collect())
    }

    async fn short_interest(&self, symbol: &str, limit: u32) -> Option<Vec<ShortInterestRecord>> {
        let url = self.url(&self.short_interest_path);
        let query = [
            ("ticker", symbol.to_string()),
            ("limit", limit.to_string()),
            ("sort", "settlement_date".to_string()),
            ("order", "desc".to_string()),
        ];

        let env: ShortInterestEnvelope = self
            .get_envelope("short interest", symbol, &url, &query)
            .await?;
        let results = check_results("short interest", symbol, env.status, env.message, env.results)?;
        if results.is_empty() {
            tracing::warn!(%symbol, "no short interest results in successful response");
            return Some(Vec::new());
        }
        Some(
            results
                .into_iter()
                .map(|r| ShortInterestRecord {
                    settlement_date: r.settlement_date,
                    short_interest: r.short_interest,
                    average_daily_volume: r.avg_daily_volume,
                    days_to_cover: r.days_to_cover,
                    ticker: r.ticker,
                })
                .collect(),
        )
    }

    async fn macd(&self, symbol: &str, query: IndicatorQuery) -> Option<MacdSeries> {
        let url = self.url(&format!("/v1/indicators/macd/{symbol}"));
        let params = indicator_params(&query);

        let env: MacdEnvelope = self.get_envelope("MACD", symbol, &url, &params).await?;
        let values = check_results(
            "MACD",
            symbol,
            env.status,
            env.message,
            env.results.and_then(|r| r.values),
        )?;
        if values.is_empty() {
            tracing::warn!(%symbol, "no MACD values in successful response");
        }
        Some(macd_series_from_values(values))
    }

    async fn rsi(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries> {
        self.fetch_scalar_indicator("RSI", "rsi", symbol, &query)
            .await
    }

    async fn ema(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries> {
        self.fetch_scalar_indicator("EMA", "ema", symbol, &query)
            .await
    }

    async fn sma(&self, symbol: &str, query: IndicatorQuery) -> Option<IndicatorSeries> {
        self.fetch_scalar_indicator("SMA", "sma", symbol, &query)
            .await
    }
}

/// Upstream-error classification: a parseable envelope still counts as a
/// failure when it reports `status == "ERROR"` or omits its results entirely.
fn check_results<T>(
    kind: &'static str,
    symbol: &str,
    status: Option<String>,
    message: Option<String>,
    results: Option<T>,
) -> Option<T> {
    if status.as_deref() == Some("ERROR") || results.is_none() {
        tracing::error!(
            %symbol,
            kind,
            status = status.as_deref().unwrap_or("<missing>"),
            message = message.as_deref().unwrap_or(""),
            "polygon reported an error"
        );
        return None;
    }
    results
}

fn indicator_params(query: &IndicatorQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("timespan", query.timespan.to_string()),
        ("order", "desc".to_string()),
        ("limit", query.limit.to_string()),
    ];
    if let Some(window) = query.window {
        params.push(("window", window.to_string()));
    }
    params
}

fn date_of_millis(timestamp: i64) -> NaiveDate {
    DateTime::from_timestamp_millis(timestamp)
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive())
}

// Do not trust upstream ordering: re-sort descending by timestamp.
fn bars_from_aggs(results: Vec<RawAgg>) -> Vec<StockBar> {
    let mut bars: Vec<StockBar> = results
        .into_iter()
        .map(|agg| StockBar {
            date: date_of_millis(agg.t),
            open: agg.o,
            high: agg.h,
            low: agg.l,
            close: agg.c,
            volume: agg.v,
            vwap: agg.vw,
            timestamp: agg.t,
            transactions: agg.n,
        })
        .collect();
    bars.sort_by_key(|bar| Reverse(bar.timestamp));
    bars
}

fn indicator_series_from_values(values: Vec<RawIndicatorValue>) -> IndicatorSeries {
    let mut points: Vec<IndicatorPoint> = values
        .into_iter()
        .map(|v| IndicatorPoint {
            timestamp: v.timestamp,
            date: date_of_millis(v.timestamp),
            value: v.value,
        })
        .collect();
    points.sort_by_key(|p| Reverse(p.timestamp));
    IndicatorSeries { values: points }
}

fn macd_series_from_values(values: Vec<RawMacdValue>) -> MacdSeries {
    let mut points: Vec<MacdPoint> = values
        .into_iter()
        .map(|v| MacdPoint {
            timestamp: v.timestamp,
            date: date_of_millis(v.timestamp),
            macd: v.value,
            signal: v.signal,
            histogram: v.histogram,
        })
        .collect();
    points.sort_by_key(|p| Reverse(p.timestamp));
    MacdSeries { values: points }
}

fn news_from_raw(raw: RawNewsArticle) -> NewsArticle {
    let summary = raw.description.clone();
    NewsArticle {
        id: raw.id,
        publisher_name: raw.publisher.name,
        publisher_logo_url: raw.publisher.logo_url,
        title: raw.title,
        author: raw.author,
        published_utc: raw.published_utc,
        article_url: raw.article_url,
        tickers: raw.tickers,
        image_url: raw.image_url,
        description: raw.description,
        summary,
    }
}

// Raw response envelopes. Every endpoint wraps its payload in
// { results?, status?, message? }.

#[derive(Debug, Deserialize)]
struct AggsEnvelope {
    #[serde(default)]
    results: Option<Vec<RawAgg>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAgg {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
    t: i64,
    #[serde(default)]
    n: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NewsEnvelope {
    #[serde(default)]
    results: Option<Vec<RawNewsArticle>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNewsArticle {
    id: String,
    publisher: RawPublisher,
    title: String,
    #[serde(default)]
    author: Option<String>,
    published_utc: DateTime<Utc>,
    article_url: String,
    tickers: Vec<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPublisher {
    name: String,
    #[serde(default)]
    logo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShortInterestEnvelope {
    #[serde(default)]
    results: Option<Vec<RawShortInterest>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawShortInterest {
    settlement_date: String,
    short_interest: f64,
    avg_daily_volume: f64,
    days_to_cover: f64,
    #[serde(default)]
    ticker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndicatorEnvelope {
    #[serde(default)]
    results: Option<RawIndicatorResults>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIndicatorResults {
    #[serde(default)]
    values: Option<Vec<RawIndicatorValue>>,
}

#[derive(Debug, Deserialize)]
struct RawIndicatorValue {
    timestamp: i64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct MacdEnvelope {
    #[serde(default)]
    results: Option<RawMacdResults>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMacdResults {
    #[serde(default)]
    values: Option<Vec<RawMacdValue>>,
}

#[derive(Debug, Deserialize)]
struct RawMacdValue {
    timestamp: i64,
    value: f64,
    signal: f64,
    histogram: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bars_sorted_descending_regardless_of_upstream_order() {
        let v = json!({
            "status": "OK",
            "results": [
                {"o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 100.0, "t": 1_700_000_000_000i64},
                {"o": 1.5, "h": 2.5, "l": 1.0, "c": 2.0, "v": 200.0, "vw": 1.9, "t": 1_700_086_400_000i64, "n": 42},
                {"o": 1.2, "h": 2.2, "l": 0.8, "c": 1.8, "v": 150.0, "t": 1_700_043_200_000i64}
            ]
        });
        let env: AggsEnvelope = serde_json::from_value(v).unwrap();
        let bars = bars_from_aggs(env.results.unwrap());

        let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![1_700_086_400_000, 1_700_043_200_000, 1_700_000_000_000]
        );
        assert_eq!(bars[0].vwap, Some(1.9));
        assert_eq!(bars[0].transactions, Some(42));
        assert_eq!(bars[2].vwap, None);
    }

    #[test]
    fn derived_date_is_utc_date_of_timestamp() {
        // 2023-11-14T22:13:20Z
        let bars = bars_from_aggs(vec![RawAgg {
            o: 1.0,
            h: 1.0,
            l: 1.0,
            c: 1.0,
            v: 1.0,
            vw: None,
            t: 1_700_000_000_000,
            n: None,
        }]);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2023, 11, 14).unwrap());
    }

    #[test]
    fn error_status_is_classified_as_failure() {
        let env: AggsEnvelope = serde_json::from_value(json!({
            "status": "ERROR",
            "message": "unknown ticker",
            "results": []
        }))
        .unwrap();
        assert!(check_results("daily aggregates", "AAPL", env.status, env.message, env.results)
            .is_none());
    }

    #[test]
    fn missing_results_is_classified_as_failure() {
        let env: AggsEnvelope =
            serde_json::from_value(json!({"status": "OK"})).unwrap();
        assert!(check_results("daily aggregates", "AAPL", env.status, env.message, env.results)
            .is_none());
    }

    #[test]
    fn empty_results_is_empty_success() {
        let env: AggsEnvelope =
            serde_json::from_value(json!({"status": "OK", "results": []})).unwrap();
        let results =
            check_results("daily aggregates", "AAPL", env.status, env.message, env.results)
                .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_aggregate_is_shape_failure() {
        // Close price as a string must not parse.
        let res = serde_json::from_value::<AggsEnvelope>(json!({
            "status": "OK",
            "results": [{"o": 1.0, "h": 2.0, "l": 0.5, "c": "1.5", "v": 100.0, "t": 1}]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn parses_news_article_and_aliases_summary() {
        let env: NewsEnvelope = serde_json::from_value(json!({
            "status": "OK",
            "results": [{
                "id": "abc123",
                "publisher": {"name": "Newswire", "logo_url": "https://example.com/logo.png"},
                "title": "Quarterly results",
                "author": "Jane Roe",
                "published_utc": "2026-02-01T12:30:00Z",
                "article_url": "https://example.com/a",
                "tickers": ["TSLA"],
                "description": "Record deliveries."
            }]
        }))
        .unwrap();

        let mut results = env.results.unwrap();
        let article = news_from_raw(results.remove(0));
        assert_eq!(article.publisher_name, "Newswire");
        assert_eq!(article.summary.as_deref(), Some("Record deliveries."));
        assert_eq!(article.tickers, vec!["TSLA"]);
    }

    #[test]
    fn macd_values_sorted_descending() {
        let env: MacdEnvelope = serde_json::from_value(json!({
            "status": "OK",
            "results": {"values": [
                {"timestamp": 1i64, "value": 0.1, "signal": 0.2, "histogram": -0.1},
                {"timestamp": 3i64, "value": 0.3, "signal": 0.2, "histogram": 0.1},
                {"timestamp": 2i64, "value": 0.2, "signal": 0.2, "histogram": 0.0}
            ]}
        }))
        .unwrap();
        let series = macd_series_from_values(env.results.unwrap().values.unwrap());
        let ts: Vec<i64> = series.values.iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![3, 2, 1]);
        assert_eq!(series.values[0].macd, 0.3);
    }

    #[test]
    fn indicator_envelope_without_values_is_failure() {
        let env: IndicatorEnvelope =
            serde_json::from_value(json!({"status": "OK", "results": {}})).unwrap();
        assert!(check_results(
            "RSI",
            "AAPL",
            env.status,
            env.message,
            env.results.and_then(|r| r.values)
        )
        .is_none());
    }
}
