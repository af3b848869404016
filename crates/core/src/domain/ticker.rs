use crate::domain::recommendation::Recommendation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A (user, symbol) pair the user follows. Owned by exactly one user identity;
/// unique per (user_id, symbol).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTicker {
    pub id: i64,
    pub user_id: String,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tracked ticker joined with the most recently updated recommendation for
/// its symbol, if any exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTickerEntry {
    #[serde(flatten)]
    pub ticker: TrackedTicker,
    pub recommendation: Option<Recommendation>,
}
