// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;
mod notify;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use voltion_core::{CycleOutcome, DecisionEngine, Notifier, StateStore};
use voltion_tesla::{TeslaClient, TeslaDeviceAdapter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Handle command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("VoltION - Home Battery Mode Automation");
                println!("Version: {VERSION}");
                println!();
                println!("Usage: voltion [CONFIG_FILE]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            _ => {}
        }
    }

    // Initialize tracing with env filter support
    // Respects RUST_LOG environment variable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config_path = args.get(1).map_or(DEFAULT_CONFIG_PATH, String::as_str);
    let config = config::AppConfig::from_file(config_path)?;

    info!("Starting VoltION - Home Battery Mode Automation v{VERSION}");
    info!("Configuration Summary:");
    info!("   Decision points: {}", config.decision_points.len());
    for (idx, point) in config.decision_points.iter().enumerate() {
        info!(
            "     [{}] {:02}:{:02}-{:02}:{:02} {} pct {} {:.0}% -> {} ({})",
            idx,
            point.time_start / 60,
            point.time_start % 60,
            point.time_end / 60,
            point.time_end % 60,
            if point.trailing_stop { "[ts]" } else { "    " },
            if point.iff_higher { ">=" } else { "<=" },
            point.pct_thresh,
            point.op_mode,
            point.reason
        );
    }
    info!("   Timezone: {}", config.engine.timezone);
    info!("   Poll interval: {}s", config.system.poll_interval_secs);
    info!("   State path: {}", config.system.state_path);

    // Resolve the Owner API token
    let token = std::env::var(&config.device.token_env).with_context(|| {
        format!(
            "Access token environment variable {} is not set",
            config.device.token_env
        )
    })?;
    let client = Arc::new(TeslaClient::owner_api(token)?);

    // Bind to the configured site, or discover it from the account
    let adapter = match config.device.site_id {
        Some(site_id) => TeslaDeviceAdapter::new(client, site_id),
        None => {
            info!("No site_id configured, discovering battery site...");
            TeslaDeviceAdapter::discover(client).await?
        }
    };
    info!("Controlling energy site {}", adapter.site_id());

    // Refuse to start against a site whose grid settings fight the engine
    adapter.verify_site_config().await?;

    let notifier: Arc<dyn Notifier> = match &config.notifications {
        Some(email) => {
            let notifier = notify::EmailNotifier::new(email)?;
            info!(
                "Email notifications enabled for {} recipient(s)",
                email.admin_recipients.len()
            );
            Arc::new(notifier)
        }
        None => {
            info!("Email notifications disabled, logging only");
            Arc::new(notify::LogOnlyNotifier)
        }
    };

    let table = config.build_table()?;
    let engine_config = config.engine_config()?;
    let store = StateStore::new(&config.system.state_path);
    let mut engine = DecisionEngine::new(table, engine_config, Arc::new(adapter), notifier, store);

    run_loop(
        &mut engine,
        Duration::from_secs(config.system.poll_interval_secs),
        config.system.failure_warning_threshold,
    )
    .await;

    info!("Shutdown complete");
    Ok(())
}

/// Drive engine cycles on a fixed interval until Ctrl-C
///
/// Shutdown is honored at cycle boundaries only, so an in-flight cycle
/// always finishes persisting before the process exits.
async fn run_loop(engine: &mut DecisionEngine, period: Duration, failure_warning_threshold: u32) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut consecutive_failures: u32 = 0;

    info!("Starting main loop (every {:?})...", period);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                return;
            }
        }

        match engine.run_cycle().await {
            Ok(outcome) => {
                consecutive_failures = 0;
                match outcome {
                    CycleOutcome::NoChange { battery_pct, mode } => {
                        info!("Cycle complete: {:.1}%, staying in {}", battery_pct, mode);
                    }
                    CycleOutcome::ModeChanged(event) => {
                        info!("Cycle complete: {}", event);
                    }
                    CycleOutcome::CommandFailed {
                        attempted,
                        battery_pct,
                    } => {
                        warn!(
                            "Cycle complete: device refused switch to {} at {:.1}%, will retry next cycle",
                            attempted, battery_pct
                        );
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= failure_warning_threshold {
                    error!(
                        "Cycle failed ({} in a row, device may be unreachable): {:#}",
                        consecutive_failures, e
                    );
                } else {
                    warn!("Cycle failed: {:#}", e);
                }
            }
        }
    }
}
