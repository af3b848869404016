use crate::domain::ticker::{TrackedTicker, TrackedTickerEntry};
use crate::storage::recommendations;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

type TickerTuple = (i64, String, String, DateTime<Utc>, DateTime<Utc>);

fn into_ticker(row: TickerTuple) -> TrackedTicker {
    let (id, user_id, symbol, created_at, updated_at) = row;
    TrackedTicker {
        id,
        user_id,
        symbol,
        created_at,
        updated_at,
    }
}

/// Adds a symbol to the user's tracked list. Returns the row plus
/// whether it was newly created (false when already tracked).
pub async fn add(
    pool: &sqlx::PgPool,
    user_id: &str,
    symbol: &str,
) -> anyhow::Result<(TrackedTicker, bool)> {
    let inserted = sqlx::query_as::<_, TickerTuple>(
        "INSERT INTO user_tickers (user_id, symbol) \
         VALUES ($1, $2) \
         ON CONFLICT (user_id, symbol) DO NOTHING \
         RETURNING id, user_id, symbol, created_at, updated_at",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("insert user ticker failed")?;

    if let Some(row) = inserted {
        return Ok((into_ticker(row), true));
    }

    let existing = sqlx::query_as::<_, TickerTuple>(
        "SELECT id, user_id, symbol, created_at, updated_at \
         FROM user_tickers \
         WHERE user_id = $1 AND symbol = $2",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_one(pool)
    .await
    .context("select existing user ticker failed")?;

    Ok((into_ticker(existing), false))
}

pub async fn remove(
    pool: &sqlx::PgPool,
    user_id: &str,
    symbol: &str,
) -> anyhow::Result<Option<TrackedTicker>> {
    let row = sqlx::query_as::<_, TickerTuple>(
        "DELETE FROM user_tickers \
         WHERE user_id = $1 AND symbol = $2 \
         RETURNING id, user_id, symbol, created_at, updated_at",
    )
    .bind(user_id)
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("delete user ticker failed")?;

    Ok(row.map(into_ticker))
}

/// Lists the user's tracked tickers, newest first, each annotated with
/// the latest stored recommendation for its symbol when one exists.
pub async fn list_with_latest(
    pool: &sqlx::PgPool,
    user_id: &str,
) -> anyhow::Result<Vec<TrackedTickerEntry>> {
    let rows = sqlx::query_as::<_, TickerTuple>(
        "SELECT id, user_id, symbol, created_at, updated_at \
         FROM user_tickers \
         WHERE user_id = $1 \
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("select user tickers failed")?;

    let tickers: Vec<TrackedTicker> = rows.into_iter().map(into_ticker).collect();

    let symbols: Vec<String> = tickers.iter().map(|t| t.symbol.clone()).collect();
    let mut latest: HashMap<String, _> = recommendations::latest_by_symbols(pool, &symbols)
        .await?
        .into_iter()
        .map(|row| (row.symbol.clone(), row.recommendation))
        .collect();

    Ok(tickers
        .into_iter()
        .map(|ticker| {
            let recommendation = latest.remove(&ticker.symbol);
            TrackedTickerEntry {
                ticker,
                recommendation,
            }
        })
        .collect())
}
