// SPDX-License-Identifier: MIT OR Apache-2.0

//! fareflux command line runner
//!
//! Reads JSON-lines ride events from a file or stdin, aggregates them per the
//! TOML configuration and logs every emitted row.
//!
//! ```text
//! fareflux --config rides.toml --input rides.jsonl --state-dir ./state \
//!          --set output.mode=update --set watermark.allowed-lateness=30s
//! ```

use clap::Parser;
use fareflux::core::config::EngineConfig;
use fareflux::core::error::{EngineError, EngineResult};
use fareflux::core::persistence::{FilePersistenceStore, SnapshotService, DEFAULT_RETAINED_REVISIONS};
use fareflux::core::stream::{JsonLinesSource, JsonRecordMapper, LogSink};
use fareflux::core::trigger::TriggerScheduler;
use fareflux::core::util::{HealthAggregator, HealthStatus, ShutdownCoordinator};
use fareflux::core::AggregationEngine;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// fareflux - event-time windowed fare and distance statistics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration override, `key=value` (repeatable)
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// JSON-lines input file; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Field holding the event time
    #[arg(long, default_value = "event_time")]
    time_field: String,

    /// Directory for engine snapshots; enables resume
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Persist a snapshot every N cycles
    #[arg(long, default_value_t = 1)]
    checkpoint_every: u64,

    /// Number of snapshot revisions kept in the state directory
    #[arg(long, default_value_t = DEFAULT_RETAINED_REVISIONS)]
    keep_snapshots: usize,

    /// Discard persisted snapshots and start from an empty state
    #[arg(long)]
    reset_state: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[fareflux] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> EngineResult<()> {
    log::info!("[fareflux] version {}", env!("CARGO_PKG_VERSION"));

    let toml_text = match &args.config {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!("cannot read '{}': {}", path.display(), e))
        })?),
        None => None,
    };
    let config = EngineConfig::load(toml_text.as_deref(), &args.overrides)?;

    let sink = Box::new(LogSink::with_prefix(format!("[{}]", config.name)));
    let snapshots = match &args.state_dir {
        Some(dir) => Some(
            SnapshotService::new(config.name.clone(), Arc::new(FilePersistenceStore::new(dir)?))
                .with_retention(args.keep_snapshots),
        ),
        None => None,
    };
    if args.reset_state {
        if let Some(service) = &snapshots {
            service.clear()?;
        }
    }
    let engine = match snapshots.as_ref().map(SnapshotService::restore_last).transpose()?.flatten() {
        Some(snapshot) => AggregationEngine::restore(config.clone(), sink, snapshot)?,
        None => AggregationEngine::new(config.clone(), sink)?,
    };
    let metrics = engine.metrics();
    let mut health = HealthAggregator::new();
    health.add_checker(Box::new(engine.health_checker()));

    let mapper = JsonRecordMapper::new(config.grouping_keys.clone(), config.measures.clone())
        .with_time_field(args.time_field.clone());
    let source = match &args.input {
        Some(path) => JsonLinesSource::open(path, mapper)?,
        None => JsonLinesSource::spawn(BufReader::new(std::io::stdin()), mapper)?,
    };

    let mut scheduler = TriggerScheduler::new(engine);
    if let Some(service) = snapshots {
        scheduler = scheduler.with_checkpoints(service, args.checkpoint_every);
    }
    let handle = scheduler.spawn(source)?;

    let coordinator = ShutdownCoordinator::new();
    let stop = coordinator.handle();
    let signal_listener = tokio::spawn(async move {
        let reason = coordinator.wait_for_shutdown_signal().await;
        log::debug!("[fareflux] shutdown signal: {:?}", reason);
    });

    let mut status = HealthStatus::Healthy;
    while !handle.is_finished() {
        if stop.is_shutdown() {
            handle.shutdown();
        }
        let current = health.overall_health();
        if current != status {
            for check in health.all_checks() {
                log::warn!("[fareflux] {} is {:?}: {}", check.component, check.status, check.message);
            }
            status = current;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    signal_listener.abort();
    let engine = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| EngineError::other(format!("scheduler join failed: {}", e)))??;

    let totals = metrics.snapshot();
    let summary = serde_json::to_string(&totals)
        .map_err(|e| EngineError::serialization(e.to_string()))?;
    log::info!(
        "[fareflux] '{}' finished at watermark {} ({:.1}% late): {}",
        engine.name(),
        engine.watermark(),
        totals.late_ratio() * 100.0,
        summary
    );
    Ok(())
}
