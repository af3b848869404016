use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advice {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "HOLD")]
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// The structured decision payload produced by the recommendation engine and
/// persisted as JSONB. Shared across all users requesting the same
/// (symbol, risk appetite) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation: Advice,
    pub confidence_level: ConfidenceLevel,
    pub justification: String,
    pub key_risks: String,
    pub data_limitations: String,
    pub sentiment_analysis: String,
    pub technical_snapshot: String,
}

/// A persisted recommendation row, unique on (symbol, risk_appetite).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRow {
    pub id: i64,
    pub symbol: String,
    pub risk_appetite: String,
    pub recommendation: Recommendation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
