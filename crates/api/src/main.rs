use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketsage_core::cache::ResponseCache;
use marketsage_core::domain::ticker::{TrackedTicker, TrackedTickerEntry};
use marketsage_core::pipeline::{AdviceReport, RecommendationPipeline};
use marketsage_core::storage;

const RESPONSE_CACHE_TTL_MINUTES: i64 = 15;
const DEFAULT_RISK_APPETITE: &str = "medium";
const MAX_SYMBOL_LEN: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = marketsage_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let pipeline = pool
        .clone()
        .map(|pool| Arc::new(RecommendationPipeline::from_settings(&settings, pool)));

    let state = AppState {
        pool,
        pipeline,
        response_cache: Arc::new(ResponseCache::new(chrono::Duration::minutes(
            RESPONSE_CACHE_TTL_MINUTES,
        ))),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/finance/:symbol", get(get_recommendation))
        .route("/tickers", get(list_tickers).post(add_ticker))
        .route("/tickers/:symbol", axum::routing::delete(remove_ticker))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    pipeline: Option<Arc<RecommendationPipeline>>,
    response_cache: Arc<ResponseCache<AdviceReport>>,
}

/// The caller's identity, taken from the `x-user-id` header set by the
/// upstream proxy after authentication.
struct AuthUser(String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(StatusCode::UNAUTHORIZED)?;
        Ok(AuthUser(user_id.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct FinanceQuery {
    #[serde(rename = "riskAppetite")]
    risk_appetite: Option<String>,
}

async fn get_recommendation(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<FinanceQuery>,
) -> Result<Json<AdviceReport>, StatusCode> {
    let Some(pipeline) = &state.pipeline else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let symbol = normalize_symbol(&symbol).ok_or(StatusCode::BAD_REQUEST)?;
    let risk_appetite = risk_appetite_or_default(query.risk_appetite.as_deref());

    let cache_key = format!("{symbol}:{risk_appetite}");
    if let Some(report) = state.response_cache.get(&cache_key) {
        tracing::debug!(%cache_key, "serving recommendation from response cache");
        return Ok(Json(report));
    }

    let report = pipeline.run(&symbol, risk_appetite).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, %symbol, "recommendation request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state.response_cache.insert(cache_key, report.clone());
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct AddTickerRequest {
    symbol: String,
}

#[derive(Debug, Serialize)]
struct TickerResponse {
    success: bool,
    message: &'static str,
    data: TrackedTicker,
}

async fn add_ticker(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AddTickerRequest>,
) -> Result<(StatusCode, Json<TickerResponse>), StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let symbol = normalize_symbol(&body.symbol).ok_or(StatusCode::BAD_REQUEST)?;

    let (ticker, created) = storage::tickers::add(pool, &user_id, &symbol)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let (status, message) = if created {
        (StatusCode::CREATED, "Ticker added successfully")
    } else {
        (StatusCode::OK, "Ticker already tracked")
    };

    Ok((
        status,
        Json(TickerResponse {
            success: true,
            message,
            data: ticker,
        }),
    ))
}

async fn list_tickers(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<TrackedTickerEntry>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let entries = storage::tickers::list_with_latest(pool, &user_id)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(entries))
}

async fn remove_ticker(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(symbol): Path<String>,
) -> Result<Json<TickerResponse>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let symbol = normalize_symbol(&symbol).ok_or(StatusCode::BAD_REQUEST)?;

    let ticker = storage::tickers::remove(pool, &user_id, &symbol)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(TickerResponse {
        success: true,
        message: "Ticker removed successfully",
        data: ticker,
    }))
}

/// The risk appetite is an opaque partition key: passed through as given,
/// only defaulted when absent or blank.
fn risk_appetite_or_default(raw: Option<&str>) -> &str {
    raw.map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_RISK_APPETITE)
}

/// Trims, uppercases, and bounds-checks a user-supplied ticker symbol.
fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return None;
    }
    Some(symbol)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &marketsage_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_symbol_trims_and_uppercases() {
        assert_eq!(normalize_symbol("  aapl "), Some("AAPL".to_string()));
    }

    #[test]
    fn normalize_symbol_rejects_empty_and_oversized() {
        assert_eq!(normalize_symbol("   "), None);
        assert_eq!(normalize_symbol("ABCDEFGHIJK"), None);
    }

    #[test]
    fn risk_appetite_is_passed_through_verbatim() {
        assert_eq!(risk_appetite_or_default(Some("High")), "High");
        assert_eq!(risk_appetite_or_default(Some(" custom ")), "custom");
    }

    #[test]
    fn risk_appetite_defaults_when_absent_or_blank() {
        assert_eq!(risk_appetite_or_default(None), "medium");
        assert_eq!(risk_appetite_or_default(Some("  ")), "medium");
    }
}
