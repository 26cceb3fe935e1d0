//! Relance: automated collection of missing justificatives.
//!
//! Runs the campaign scheduler on a fixed tick against the in-memory store.

mod demo;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use relance_campaigns::{CampaignEngine, QuietHoursPolicy, StopPolicy};
use relance_channels::{ChannelDispatcher, RecordingSender};
use relance_core::clock::{system_clock, Clock};
use relance_core::config::AppConfig;
use relance_matching::MatchingEngine;
use relance_store::memory::InMemoryStore;

#[derive(Parser, Debug)]
#[command(name = "relance")]
#[command(about = "Outreach scheduler and document reconciliation for missing justificatives")]
#[command(version)]
struct Cli {
    /// Seconds between scheduler cycles (overrides config)
    #[arg(long, env = "RELANCE__SCHEDULER__TICK_INTERVAL_SECS")]
    tick_interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Load a demo tenant with a campaign, open lines and one receipt
    #[arg(long, default_value_t = false)]
    seed_demo: bool,

    /// Record outreach instead of calling the channel providers
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relance=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Relance starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(secs) = cli.tick_interval {
        config.scheduler.tick_interval_secs = secs;
    }
    config.validate()?;

    info!(
        tick_interval_secs = config.scheduler.tick_interval_secs,
        quiet_start = config.quiet_hours.start_hour,
        quiet_end = config.quiet_hours.end_hour,
        channels = ?config.channels.enabled,
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryStore::new());
    let clock = system_clock();
    let recorder = Arc::new(RecordingSender::new());
    let dispatcher = if cli.dry_run {
        info!("Dry run: outreach is recorded, not sent");
        Arc::new(ChannelDispatcher::single(recorder.clone()))
    } else {
        Arc::new(ChannelDispatcher::with_default_providers(
            config.channels.enabled.clone(),
        ))
    };

    let campaigns = CampaignEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        clock.clone(),
    )
    .with_stop_policy(StopPolicy::from_config(&config.stop_policy))
    .with_quiet_hours(QuietHoursPolicy::from_config(&config.quiet_hours)?);

    let matching = MatchingEngine::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        config.matching.clone(),
    );

    let mut inbox = Vec::new();
    if cli.seed_demo {
        inbox = demo::seed(&store, clock.now());
        info!(documents = inbox.len(), "Demo data loaded");
    }

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.scheduler.tick_interval_secs));

    info!("Scheduler is running");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match campaigns.run_cycle().await {
                    Ok(report) if report.skipped => warn!("Cycle skipped"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Cycle aborted"),
                }

                // Receipts that came in since the last tick.
                for mut document in inbox.drain(..) {
                    match matching.auto_match(&mut document).await {
                        Ok(decision) => info!(
                            document_id = %document.id,
                            auto_matched = decision.is_auto_matched(),
                            confidence = ?decision.proposal().map(|p| p.confidence),
                            "Document reconciled"
                        ),
                        Err(e) => error!(document_id = %document.id, error = %e, "Matching failed"),
                    }
                }

                if cli.dry_run {
                    info!(recorded = recorder.count(), "Dry-run outreach so far");
                }
                if cli.once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Relance stopped");
    Ok(())
}
