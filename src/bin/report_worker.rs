//! One-shot report generation worker.
//!
//! The monthly aggregation may scan a facility's whole catalog, so the
//! surrounding system invokes it out of band. This binary is that
//! invocation: connect, optionally migrate, generate one report, print
//! the summary as JSON.

use clap::Parser;
use pharmstock::{
    common::ReportPeriod,
    config, db,
    events::event_channel,
    services::reporting::GenerateOptions,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "report-worker", about = "Generate a monthly inventory report")]
struct Args {
    /// Facility to report on.
    #[arg(long)]
    facility_id: i64,

    /// Reporting period, YYYY-MM.
    #[arg(long)]
    period: String,

    /// Discard and regenerate an existing report.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config()?;
    init_tracing(&config);

    let period: ReportPeriod = args.period.parse().map_err(|e| anyhow::anyhow!("{}", e))?;

    let pool = Arc::new(db::create_db_pool().await?);
    if config.auto_migrate {
        db::run_migrations(pool.as_ref()).await?;
    }

    // Worker context: events are drained and dropped, broadcasting is
    // the online system's concern.
    let (event_sender, mut event_rx) = event_channel(64);
    tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

    let state = AppState::new(pool, config, Arc::new(event_sender));
    let summary = state
        .reporting
        .generate(
            args.facility_id,
            period,
            GenerateOptions {
                force: args.force,
                created_by: None,
            },
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing(config: &config::AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
