use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ideaboard_core::domain::analyst::LeaderboardEntry;
use ideaboard_core::market::iex::IexQuoteClient;
use ideaboard_core::performance::engine::{PerformanceEngine, RunOptions, RunReport};
use ideaboard_core::storage::leaderboard::{self, LeaderboardQuery};
use ideaboard_core::storage::lock::RunLock;
use ideaboard_core::storage::pg::PgStore;
use ideaboard_core::storage::runs::RunRecord;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ideaboard_core::config::Settings::from_env()?;
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
            Ok(pool) => match ideaboard_core::storage::migrate(&pool).await {
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

    let quotes = match IexQuoteClient::from_settings(&settings) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "market data not configured; performance updates disabled");
            None
        }
    };

    let state = AppState {
        pool,
        quotes,
        admin_token: settings.admin_api_token.clone().map(Arc::from),
        run_deadline: run_deadline_from_env(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/analysts/leaderboard", get(get_leaderboard))
        .route("/analysts/:id/performance", get(get_analyst_performance))
        .route("/performance/update", post(update_performance))
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
    quotes: Option<Arc<IexQuoteClient>>,
    admin_token: Option<Arc<str>>,
    run_deadline: Duration,
}

const DEFAULT_RUN_DEADLINE_SECS: u64 = 600;

fn run_deadline_from_env() -> Duration {
    let secs = std::env::var("PERFORMANCE_RUN_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_RUN_DEADLINE_SECS);
    Duration::from_secs(secs)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaderboardParams {
    sort_column: Option<String>,
    order_type: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl LeaderboardParams {
    fn to_query(&self) -> anyhow::Result<LeaderboardQuery> {
        LeaderboardQuery::try_new(
            self.sort_column.as_deref(),
            self.order_type.as_deref(),
            self.page,
            self.page_size,
        )
    }
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let query = params.to_query().map_err(|e| {
        tracing::debug!(error = %e, "invalid leaderboard query");
        StatusCode::BAD_REQUEST
    })?;

    let entries = leaderboard::fetch_leaderboard(pool, &query)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(entries))
}

async fn get_analyst_performance(
    State(state): State<AppState>,
    Path(analyst_id): Path<i64>,
) -> Result<Json<LeaderboardEntry>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let entry = leaderboard::fetch_analyst(pool, analyst_id)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRun {
    run_id: Option<Uuid>,
    status: &'static str,
    report: RunReport,
}

async fn update_performance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiRun>, StatusCode> {
    if !is_authorized(state.admin_token.as_deref(), &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let (Some(pool), Some(quotes)) = (&state.pool, &state.quotes) else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let lock = ideaboard_core::storage::lock::try_acquire_performance_lock(pool)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::CONFLICT)?;

    // Detached so a dropped request cannot cancel the run before it is recorded.
    let task = tokio::spawn(run_and_record(
        pool.clone(),
        Arc::clone(quotes),
        lock,
        state.run_deadline,
    ));
    let (record, run_id, outcome) = task.await.map_err(|e| {
        let err = anyhow::Error::new(e).context("performance run task failed");
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "performance run task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let as_of_date = record.as_of_date;

    let report = outcome.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(%as_of_date, error = %e, "performance run failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ApiRun {
        run_id,
        status: record.status.as_str(),
        report,
    }))
}

async fn run_and_record(
    pool: PgPool,
    quotes: Arc<IexQuoteClient>,
    lock: RunLock,
    deadline: Duration,
) -> (RunRecord, Option<Uuid>, anyhow::Result<RunReport>) {
    let started_at = chrono::Utc::now();
    let as_of_date = started_at.date_naive();
    let store = PgStore::new(pool.clone());
    let engine = PerformanceEngine::new(&store, &store, &*quotes);
    let outcome = with_deadline(deadline, engine.run(&RunOptions::new(as_of_date))).await;

    let record = RunRecord::from_outcome("api", started_at, as_of_date, &outcome);
    let run_id = match ideaboard_core::storage::runs::record_performance_run(&pool, &record).await {
        Ok(id) => Some(id),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to record performance run");
            None
        }
    };

    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "performance lock release failed");
    }

    (record, run_id, outcome)
}

async fn with_deadline<F>(deadline: Duration, run: F) -> anyhow::Result<RunReport>
where
    F: std::future::Future<Output = anyhow::Result<RunReport>>,
{
    match tokio::time::timeout(deadline, run).await {
        Ok(outcome) => outcome,
        Err(_) => Err(anyhow::anyhow!(
            "performance run exceeded its {}s deadline",
            deadline.as_secs_f64()
        )),
    }
}

/// No configured token leaves the trigger open.
fn is_authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim() == expected)
        .unwrap_or(false)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &ideaboard_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
