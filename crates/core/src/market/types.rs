use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation. `date` is the UTC calendar date of the millisecond
/// timestamp. Sequences handed to callers are sorted descending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub publisher_name: String,
    pub publisher_logo_url: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub published_utc: DateTime<Utc>,
    pub article_url: String,
    pub tickers: Vec<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    /// Alias for `description`; the upstream feed has no separate summary field.
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortInterestRecord {
    pub settlement_date: String,
    pub short_interest: f64,
    pub average_daily_volume: f64,
    pub days_to_cover: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

/// One point of a scalar indicator series (RSI, EMA, SMA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub values: Vec<IndicatorPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacdSeries {
    pub values: Vec<MacdPoint>,
}

/// Parameters for a technical-indicator request.
#[derive(Debug, Clone)]
pub struct IndicatorQuery {
    pub timespan: &'static str,
    pub window: Option<u32>,
    pub limit: u32,
}

impl Default for IndicatorQuery {
    fn default() -> Self {
        Self {
            timespan: "day",
            window: None,
            limit: 60,
        }
    }
}
