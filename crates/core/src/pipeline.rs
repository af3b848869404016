use crate::config::Settings;
use crate::domain::recommendation::{Recommendation, RecommendationRow};
use crate::llm::gemini::GeminiClient;
use crate::llm::{EngineInput, EngineReply, RecommendationEngine};
use crate::market::polygon::PolygonClient;
use crate::market::types::{
    IndicatorQuery, IndicatorSeries, MacdSeries, NewsArticle, ShortInterestRecord, StockBar,
};
use crate::market::MarketData;
use crate::storage::recommendations;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DAILY_LOOKBACK_DAYS: i64 = 60;
const WEEKLY_LOOKBACK_WEEKS: i64 = 52;
const NEWS_LIMIT: u32 = 10;
const SHORT_INTEREST_LIMIT: u32 = 12;
const EMA_WINDOW: u32 = 12;
const SMA_WINDOW: u32 = 20;

const MSG_POLYGON_KEY_MISSING: &str =
    "Polygon API key is not configured. Please set POLYGON_API_KEY.";
const MSG_GEMINI_KEY_MISSING: &str =
    "Gemini API key is not configured. Please set GEMINI_API_KEY.";
const MSG_ENGINE_UNAVAILABLE: &str =
    "Failed to retrieve investment recommendation from AI service.";
const MSG_UNEXPECTED: &str =
    "An unexpected error occurred while generating the recommendation.";
const MSG_INSUFFICIENT_DATA: &str =
    "Insufficient stock data to generate a recommendation.";
const NO_NEWS_SUMMARY: &str = "No news summary available.";

/// Per-source failure notes accumulated while assembling a response. Every
/// field is independent; a populated field never blocks the rest of the
/// response from being produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_stock: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon_news: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_interest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

impl FetchErrors {
    pub fn is_empty(&self) -> bool {
        self == &FetchErrors::default()
    }
}

/// The merged market dataset handed to the recommendation engine. News is
/// summarized separately and deliberately excluded from this payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMarketData {
    pub daily: Vec<StockBar>,
    pub weekly: Vec<StockBar>,
    pub short_interest: Vec<ShortInterestRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<MacdSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<IndicatorSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema: Option<IndicatorSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma: Option<IndicatorSeries>,
}

/// What a recommendation request produces: a stored row when one could be
/// served or generated, plus whatever per-source errors accumulated. Both can
/// be present at once (partial data still yields advice).
#[derive(Debug, Clone, Serialize)]
pub struct AdviceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RecommendationRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FetchErrors>,
}

impl AdviceReport {
    fn with_errors(data: Option<RecommendationRow>, errors: FetchErrors) -> Self {
        Self {
            data,
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}

/// Orchestrates a recommendation request end to end: freshness check against
/// storage, market-data fan-out, engine call, and persistence. Clients are
/// optional so the service can start without credentials and answer with a
/// configuration error instead of refusing to boot.
pub struct RecommendationPipeline {
    pool: sqlx::PgPool,
    market: Option<Arc<dyn MarketData>>,
    engine: Option<Arc<dyn RecommendationEngine>>,
}

impl RecommendationPipeline {
    pub fn from_settings(settings: &Settings, pool: sqlx::PgPool) -> Self {
        let market: Option<Arc<dyn MarketData>> = match PolygonClient::from_settings(settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                tracing::warn!(error = %err, "market data client unavailable");
                None
            }
        };

        let engine: Option<Arc<dyn RecommendationEngine>> =
            match GeminiClient::from_settings(settings) {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    tracing::warn!(error = %err, "recommendation engine unavailable");
                    None
                }
            };

        Self {
            pool,
            market,
            engine,
        }
    }

    pub async fn run(&self, symbol: &str, risk_appetite: &str) -> anyhow::Result<AdviceReport> {
        let now = Utc::now();

        if let Some(row) =
            recommendations::find_fresh(&self.pool, symbol, risk_appetite, now).await?
        {
            tracing::info!(symbol, risk_appetite, "serving stored recommendation");
            return Ok(AdviceReport {
                data: Some(row),
                errors: None,
            });
        }

        let Some(market) = &self.market else {
            let errors = FetchErrors {
                other: Some(MSG_POLYGON_KEY_MISSING.to_string()),
                ..Default::default()
            };
            return Ok(AdviceReport::with_errors(None, errors));
        };
        let Some(engine) = &self.engine else {
            let errors = FetchErrors {
                other: Some(MSG_GEMINI_KEY_MISSING.to_string()),
                ..Default::default()
            };
            return Ok(AdviceReport::with_errors(None, errors));
        };

        let (data, news, mut errors) = collect_market_data(market.as_ref(), symbol).await;

        let recommendation =
            generate_advice(engine.as_ref(), &data, news.as_deref(), symbol, risk_appetite, &mut errors)
                .await?;

        let row = match recommendation {
            Some(recommendation) => {
                match recommendations::upsert(&self.pool, symbol, risk_appetite, &recommendation, now)
                    .await
                {
                    Ok(row) => Some(row),
                    Err(err) => {
                        tracing::error!(error = %err, symbol, "failed to store recommendation");
                        errors.other = Some(MSG_UNEXPECTED.to_string());
                        None
                    }
                }
            }
            None => None,
        };

        Ok(AdviceReport::with_errors(row, errors))
    }
}

/// The decision step after the fan-out: consults the engine when enough data
/// came back and returns the payload to persist, noting terminal failures in
/// `errors.other`. A reply that explicitly declines yields nothing to persist
/// and leaves the accumulated fetch errors untouched.
pub async fn generate_advice(
    engine: &dyn RecommendationEngine,
    data: &AggregatedMarketData,
    news: Option<&[NewsArticle]>,
    symbol: &str,
    risk_appetite: &str,
    errors: &mut FetchErrors,
) -> anyhow::Result<Option<Recommendation>> {
    if data.daily.is_empty() {
        errors.other = Some(MSG_INSUFFICIENT_DATA.to_string());
        return Ok(None);
    }

    let input = EngineInput {
        news_summary: news_summary(news),
        risk_appetite: risk_appetite.to_string(),
        market_data_json: serde_json::to_string(data)?,
        comprehensive: true,
    };

    match engine.recommend(&input).await {
        Some(EngineReply::Advice(recommendation)) => Ok(Some(recommendation)),
        Some(EngineReply::Rejected { error }) => {
            tracing::warn!(symbol, error, "engine declined to recommend");
            Ok(None)
        }
        None => {
            errors.other = Some(MSG_ENGINE_UNAVAILABLE.to_string());
            Ok(None)
        }
    }
}

/// Fetches all market data sources concurrently and settles every branch:
/// a failed or empty source becomes a `FetchErrors` note, never an abort.
pub async fn collect_market_data(
    market: &dyn MarketData,
    symbol: &str,
) -> (AggregatedMarketData, Option<Vec<NewsArticle>>, FetchErrors) {
    let scalar = |window| IndicatorQuery {
        window,
        ..IndicatorQuery::default()
    };

    let (daily, weekly, news, short_interest, macd, rsi, ema, sma) = tokio::join!(
        market.daily_bars(symbol, DAILY_LOOKBACK_DAYS),
        market.weekly_bars(symbol, WEEKLY_LOOKBACK_WEEKS),
        market.news(symbol, NEWS_LIMIT),
        market.short_interest(symbol, SHORT_INTEREST_LIMIT),
        market.macd(symbol, IndicatorQuery::default()),
        market.rsi(symbol, IndicatorQuery::default()),
        market.ema(symbol, scalar(Some(EMA_WINDOW))),
        market.sma(symbol, scalar(Some(SMA_WINDOW))),
    );

    let mut data = AggregatedMarketData::default();
    let mut errors = FetchErrors::default();

    match daily {
        Some(bars) if bars.is_empty() => {
            errors.stock = Some(format!("No daily stock data for {symbol}."))
        }
        Some(bars) => data.daily = bars,
        None => errors.stock = Some(format!("Error fetching daily stock data for {symbol}.")),
    }

    match weekly {
        Some(bars) if bars.is_empty() => {
            errors.weekly_stock = Some(format!("No weekly stock data for {symbol}."))
        }
        Some(bars) => data.weekly = bars,
        None => {
            errors.weekly_stock = Some(format!("Error fetching weekly stock data for {symbol}."))
        }
    }

    let news = match news {
        Some(articles) if articles.is_empty() => {
            errors.polygon_news = Some(format!("No Polygon news for {symbol}."));
            None
        }
        Some(articles) => Some(articles),
        None => {
            errors.polygon_news = Some(format!("Error fetching Polygon news for {symbol}."));
            None
        }
    };

    match short_interest {
        Some(records) if records.is_empty() => {
            errors.short_interest = Some(format!("No short interest data for {symbol}."))
        }
        Some(records) => data.short_interest = records,
        None => {
            errors.short_interest =
                Some(format!("Error fetching short interest data for {symbol}."))
        }
    }

    match macd {
        Some(series) if series.values.is_empty() => {
            errors.macd = Some(format!("No MACD data for {symbol}."))
        }
        Some(series) => data.macd = Some(series),
        None => errors.macd = Some(format!("Error fetching MACD data for {symbol}.")),
    }

    match rsi {
        Some(series) if series.values.is_empty() => {
            errors.rsi = Some(format!("No RSI data for {symbol}."))
        }
        Some(series) => data.rsi = Some(series),
        None => errors.rsi = Some(format!("Error fetching RSI data for {symbol}.")),
    }

    match ema {
        Some(series) if series.values.is_empty() => {
            errors.ema = Some(format!("No EMA data for {symbol}."))
        }
        Some(series) => data.ema = Some(series),
        None => errors.ema = Some(format!("Error fetching EMA data for {symbol}.")),
    }

    match sma {
        Some(series) if series.values.is_empty() => {
            errors.sma = Some(format!("No SMA data for {symbol}."))
        }
        Some(series) => data.sma = Some(series),
        None => errors.sma = Some(format!("Error fetching SMA data for {symbol}.")),
    }

    (data, news, errors)
}

/// Joins article summaries (falling back to descriptions) into the prompt's
/// news block.
fn news_summary(news: Option<&[NewsArticle]>) -> String {
    let Some(articles) = news else {
        return NO_NEWS_SUMMARY.to_string();
    };

    let lines: Vec<&str> = articles
        .iter()
        .filter_map(|a| a.summary.as_deref().or(a.description.as_deref()))
        .filter(|s| !s.is_empty())
        .collect();

    if lines.is_empty() {
        NO_NEWS_SUMMARY.to_string()
    } else {
        lines.join("\n")
    }
}
