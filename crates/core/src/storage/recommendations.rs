use crate::domain::recommendation::{Recommendation, RecommendationRow};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;

/// Stored recommendations older than this are recomputed on demand.
const FRESHNESS_WINDOW_HOURS: i64 = 1;

pub fn freshness_cutoff(as_of: DateTime<Utc>) -> DateTime<Utc> {
    as_of - Duration::hours(FRESHNESS_WINDOW_HOURS)
}

type RecommendationTuple = (
    i64,
    String,
    String,
    Json<Recommendation>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn into_row(row: RecommendationTuple) -> RecommendationRow {
    let (id, symbol, risk_appetite, Json(recommendation), created_at, updated_at) = row;
    RecommendationRow {
        id,
        symbol,
        risk_appetite,
        recommendation,
        created_at,
        updated_at,
    }
}

/// Returns the latest stored recommendation for (symbol, risk appetite),
/// but only if it was updated inside the freshness window.
pub async fn find_fresh(
    pool: &sqlx::PgPool,
    symbol: &str,
    risk_appetite: &str,
    as_of: DateTime<Utc>,
) -> anyhow::Result<Option<RecommendationRow>> {
    let row = sqlx::query_as::<_, RecommendationTuple>(
        "SELECT id, symbol, risk_appetite, recommendation, created_at, updated_at \
         FROM recommendations \
         WHERE symbol = $1 AND risk_appetite = $2 AND updated_at > $3 \
         ORDER BY updated_at DESC \
         LIMIT 1",
    )
    .bind(symbol)
    .bind(risk_appetite)
    .bind(freshness_cutoff(as_of))
    .fetch_optional(pool)
    .await
    .context("select fresh recommendation failed")?;

    Ok(row.map(into_row))
}

pub async fn upsert(
    pool: &sqlx::PgPool,
    symbol: &str,
    risk_appetite: &str,
    recommendation: &Recommendation,
    now: DateTime<Utc>,
) -> anyhow::Result<RecommendationRow> {
    let row = sqlx::query_as::<_, RecommendationTuple>(
        "INSERT INTO recommendations (symbol, risk_appetite, recommendation, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) \
         ON CONFLICT (symbol, risk_appetite) DO UPDATE \
           SET recommendation = EXCLUDED.recommendation, updated_at = EXCLUDED.updated_at \
         RETURNING id, symbol, risk_appetite, recommendation, created_at, updated_at",
    )
    .bind(symbol)
    .bind(risk_appetite)
    .bind(Json(recommendation))
    .bind(now)
    .fetch_one(pool)
    .await
    .context("upsert recommendation failed")?;

    Ok(into_row(row))
}

/// Latest recommendation per symbol, regardless of freshness. Used to
/// annotate tracked-ticker listings.
pub async fn latest_by_symbols(
    pool: &sqlx::PgPool,
    symbols: &[String],
) -> anyhow::Result<Vec<RecommendationRow>> {
    if symbols.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, RecommendationTuple>(
        "SELECT DISTINCT ON (symbol) id, symbol, risk_appetite, recommendation, created_at, updated_at \
         FROM recommendations \
         WHERE symbol = ANY($1) \
         ORDER BY symbol, updated_at DESC",
    )
    .bind(symbols)
    .fetch_all(pool)
    .await
    .context("select latest recommendations failed")?;

    Ok(rows.into_iter().map(into_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_one_hour_before() {
        let as_of = Utc::now();
        assert_eq!(as_of - freshness_cutoff(as_of), Duration::hours(1));
    }
}
