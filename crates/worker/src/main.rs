use anyhow::Context;
use clap::Parser;
use ideaboard_core::market::error::QuoteError;
use ideaboard_core::market::iex::IexQuoteClient;
use ideaboard_core::market::{Quote, QuoteSource};
use ideaboard_core::performance::engine::{PerformanceEngine, RunOptions};
use ideaboard_core::storage::pg::PgStore;
use ideaboard_core::storage::runs::RunRecord;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod summary;

#[derive(Debug, Parser)]
#[command(name = "ideaboard_worker")]
struct Args {
    /// Reference date for open-idea holding periods (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Compute and log rankings from stored prices without writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Rank on stored prices; do not call the market-data provider.
    #[arg(long)]
    skip_price_refresh: bool,

    /// Abort before ranking if any quote lookup fails.
    #[arg(long)]
    fail_on_quote_error: bool,
}

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

    let args = Args::parse();
    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref())?;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    let store = PgStore::new(pool.clone());

    if args.dry_run {
        // No price refresh in a dry run, so the provider may be unconfigured.
        let quotes = OfflineQuotes;
        let engine = PerformanceEngine::new(&store, &store, &quotes);
        let rankings = engine.compute_rankings(as_of_date).await?;
        summary::log_rankings(as_of_date, &rankings);
        return Ok(());
    }

    ideaboard_core::storage::migrate(&pool).await?;

    let quotes: Box<dyn QuoteSource> = if args.skip_price_refresh {
        Box::new(OfflineQuotes)
    } else {
        Box::new(IexQuoteClient::from_settings(&settings)?)
    };

    let Some(lock) = ideaboard_core::storage::lock::try_acquire_performance_lock(&pool).await? else {
        tracing::warn!(%as_of_date, "performance lock not acquired; another run in progress");
        return Ok(());
    };

    let opts = RunOptions {
        as_of: as_of_date,
        refresh_prices: !args.skip_price_refresh,
        fail_on_quote_error: args.fail_on_quote_error,
    };

    let started_at = chrono::Utc::now();
    let engine = PerformanceEngine::new(&store, &store, &*quotes);
    let outcome = engine.run(&opts).await;

    let record = RunRecord::from_outcome("worker", started_at, as_of_date, &outcome);
    match ideaboard_core::storage::runs::record_performance_run(&pool, &record).await {
        Ok(run_id) => tracing::info!(%run_id, status = record.status.as_str(), "performance run recorded"),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to record performance run");
        }
    }

    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "performance lock release failed");
    }

    match outcome {
        Ok(run) => {
            if run.quote_failures() > 0 {
                tracing::warn!(
                    %as_of_date,
                    quote_failures = run.quote_failures(),
                    "performance run finished with stale prices"
                );
            }
            summary::log_rankings(as_of_date, &run.rankings);
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%as_of_date, error = %err, "performance run failed");
            Err(err)
        }
    }
}

/// Stand-in source for runs that never refresh prices.
struct OfflineQuotes;

#[async_trait::async_trait]
impl QuoteSource for OfflineQuotes {
    fn source_name(&self) -> &'static str {
        "offline"
    }

    async fn latest_quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        Err(QuoteError::new(symbol, "request", "price refresh disabled for this run").into())
    }
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

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date: {s}"));
    }

    Ok(chrono::Utc::now().date_naive())
}
