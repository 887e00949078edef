//! ESPN Event Ingestion Service
//!
//! Runs the scheduled collection cycle for every configured league, either
//! once (`RUN_ONCE=true`) or on a fixed interval with a health endpoint.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use espn_ingestion::config::Config;
use espn_ingestion::espn::EspnClient;
use espn_ingestion::health::{self, HealthState};
use espn_ingestion::pending::RedisPendingIds;
use espn_ingestion::report::RunReport;
use espn_ingestion::store::PgEventStore;
use espn_ingestion::{load_calendars, IngestionPipeline, SeasonCalendar};

type Pipeline = IngestionPipeline<EspnClient, PgEventStore, RedisPendingIds>;

/// One scheduled cycle; "today" is the local calendar date.
async fn run_cycle(pipeline: &Pipeline, calendars: &[SeasonCalendar], config: &Config) -> Result<RunReport> {
    let today = chrono::Local::now().date_naive();
    let report = pipeline.run_scheduled(calendars, today).await?;

    if let Err(e) = report.write(&config.report_dir) {
        warn!("Failed to write run reports: {:#}", e);
    }
    Ok(report)
}

async fn run_loop(pipeline: &Pipeline, calendars: &[SeasonCalendar], config: &Config, health: &HealthState) {
    info!(
        "Starting ingestion loop (interval: {}s)",
        config.run_interval_seconds
    );

    loop {
        let start = std::time::Instant::now();

        match run_cycle(pipeline, calendars, config).await {
            Ok(report) => {
                health.record_success(report.inserted(), report.fetch_failures()).await;
                info!(
                    "Run completed: {} events stored, {} fetch failures in {:?}",
                    report.inserted(),
                    report.fetch_failures(),
                    start.elapsed()
                );
            }
            Err(e) => {
                health.record_error().await;
                error!("Run failed: {:?}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(config.run_interval_seconds)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // local development only; deployments use the environment and /run/secrets
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("espn_ingestion=info".parse()?),
        )
        .init();

    info!("ESPN Event Ingestion Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let calendars = load_calendars(&config.leagues_config)
        .with_context(|| format!("Failed to load league calendars from {}", config.leagues_config.display()))?;
    info!("Loaded {} league calendars", calendars.len());

    let store = PgEventStore::connect(&config.database_url, 5).await?;
    store.ensure_schema().await?;
    let pending = RedisPendingIds::connect(&config.redis_url, 5).await?;
    let source = EspnClient::new(
        config.espn_base_url.clone(),
        config.fetch_timeout,
        config.requests_per_second,
        config.fetch_retry.clone(),
    )?;
    let pipeline = IngestionPipeline::new(source, store, pending);

    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        let report = run_cycle(&pipeline, &calendars, &config).await.map_err(|e| {
            error!("One-shot run failed: {:?}", e);
            e
        })?;
        info!(
            "One-shot run completed: {} events stored, {} incomplete, {} fetch failures",
            report.inserted(),
            report.incomplete().len(),
            report.fetch_failures()
        );
        return Ok(());
    }

    let health_state = HealthState::new();
    let health_addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&health_addr).await?;
    info!("Health endpoint listening on {}", health_addr);

    let app = health::router(health_state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Health server stopped: {}", e);
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = run_loop(&pipeline, &calendars, &config, &health_state) => {}
        _ = &mut ctrl_c => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
