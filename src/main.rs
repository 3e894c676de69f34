//! loctrack-sim - drives the tracking service against a simulated device
//!
//! The device walks in a slow circle; continuous mode reports a fix per
//! interval, geofence mode reports one each time the device leaves the
//! watched 100 m circle.
//!
//! Module structure:
//! - `domain/` - Fixes, regions, sessions, errors
//! - `io/` - Platform seams plus the mock and simulated platforms
//! - `services/` - Callback registry, controllers, lifecycle shell
//! - `infra/` - Config, Metrics

use clap::{Parser, ValueEnum};
use loctrack::infra::{Config, Metrics};
use loctrack::io::simulated::{SimulatedDevice, WalkConfig};
use loctrack::io::Capability;
use loctrack::services::{LocationModule, LocationService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Continuous,
    Geofence,
}

/// Location tracking simulator
#[derive(Parser, Debug)]
#[command(name = "loctrack-sim", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    #[arg(short, long, value_enum, default_value = "continuous")]
    mode: Mode,

    /// Polling interval in ms (continuous mode; defaults to the config value)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Walking speed of the simulated device
    #[arg(long, default_value_t = 12.0)]
    speed_mps: f64,

    /// Deny precise location (geofence regions cannot be registered)
    #[arg(long)]
    approximate_only: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Default: INFO, use RUST_LOG=debug for per-fix traffic
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "loctrack_sim_starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        default_interval_ms = %config.default_interval_ms(),
        enabled_modes = ?config.enabled_modes(),
        geofence_radius_m = %config.geofence_radius_m(),
        dispatch_queue_size = %config.dispatch_queue_size(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let device = Arc::new(SimulatedDevice::new(WalkConfig {
        speed_mps: args.speed_mps,
        ..Default::default()
    }));
    if args.approximate_only {
        device.capabilities().set(Capability::PreciseLocation, false);
    }
    tokio::spawn(device.clone().run(shutdown_rx.clone()));

    let handle = LocationService::spawn(config.clone(), device.platform(), metrics.clone());
    let module = LocationModule::new(handle, &config);

    // Foreground listener, as the embedding runtime would subscribe
    let mut updates = module.on_location_update();
    let mut fg_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(u) => info!(lat = %u.latitude, lng = %u.longitude, acc = %u.accuracy, "foreground_update"),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = %n, "foreground_lagged"),
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = fg_shutdown.changed() => break,
            }
        }
    });

    // Background handler receives the serialized record
    module.register_background_handler(|update| {
        let payload = serde_json::to_string(update)
            .map_err(|e| loctrack::domain::CallbackError::Failed(e.to_string()))?;
        info!(payload = %payload, "background_update");
        Ok(())
    });

    let metrics_reporter = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_reporter.report().log();
        }
    });

    let started = match args.mode {
        Mode::Continuous => match args.interval_ms {
            Some(interval_ms) => module.start(interval_ms).await,
            None => module.start_default().await,
        },
        Mode::Geofence => module.start_with_geofence().await,
    };
    info!(mode = ?args.mode, active = %started, "tracking_requested");

    match args.duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown_signal_received");
        }
    }

    module.stop().await;
    let _ = shutdown_tx.send(true);
    metrics.report().log();

    info!("loctrack-sim shutdown complete");
    Ok(())
}
