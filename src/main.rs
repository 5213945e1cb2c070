use chrono::{Duration, Utc};
use clientpulse::{DateRange, Engine, Provider};
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = clientpulse::config::Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        lookback_days = cfg.sync_lookback_days,
    );

    let storage = clientpulse::db::connect(&cfg.database_url).await?;
    let engine = Engine::new(&cfg, storage)?;

    let Some(client_id) = cfg.sync_client_id.clone() else {
        info!("no PULSE_SYNC_CLIENT_ID configured; nothing to sync");
        return Ok(());
    };

    let today = Utc::now().date_naive();
    let start = today - Duration::days(i64::from(cfg.sync_lookback_days) - 1);
    let range = DateRange::new(start, today)?;
    info!(client_id, start = %range.start, end = %range.end, "starting sync pass");

    for (provider, result) in engine.sync_all(&client_id, range).await {
        match result {
            Ok(outcome) => {
                info!(
                    provider = %provider,
                    stored = outcome.records_stored,
                    failed = outcome.failures.len(),
                    "provider sync complete"
                );
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "provider sync failed");
            }
        }
    }

    for provider in Provider::ALL {
        match engine.get_aggregated(&client_id, provider, range).await {
            Ok(window) => {
                info!(
                    provider = %provider,
                    average_score = window.average_score,
                    trend = ?window.trend,
                    change_percent = window.change_percent,
                    "aggregate window"
                );
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "aggregate read failed");
            }
        }
    }

    Ok(())
}
