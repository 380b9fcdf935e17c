//! Conntrack monitor entrypoint. Runs one collection cycle, or a loop on the configured
//! interval: acquire → aggregate → persist → prune → score.

use conntrack_monitor::{
    aggregate::{self, ConnectionSummary},
    anomaly::{self, AnomalyScorer, ScoreOutcome},
    collectors::{privilege, ConntrackCollector},
    config::MonitorConfig,
    logging::StructuredLogger,
    storage::SnapshotStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Anomalies logged per cycle
const LOGGED_ANOMALIES: usize = 5;

fn run_one_cycle(
    collector: &ConntrackCollector,
    store: &SnapshotStore,
    scorer: &AnomalyScorer,
    config: &MonitorConfig,
) -> Result<Option<ConnectionSummary>, Box<dyn std::error::Error + Send + Sync>> {
    let acquisition = collector.acquire_detailed();
    if acquisition.records.is_empty() {
        if acquisition.requires_elevated_privileges() {
            warn!("conntrack requires elevated privileges (run as root or grant CAP_NET_ADMIN)");
        } else {
            warn!("no connection-tracking data available");
        }
        return Ok(None);
    }
    let records = acquisition.records;
    info!(
        count = records.len(),
        source = acquisition.source.as_deref().unwrap_or_default(),
        "collected connections"
    );

    let metrics = if records.len() > config.collectors.max_metrics_records {
        warn!(count = records.len(), "large snapshot, skipping metric aggregation");
        None
    } else {
        Some(aggregate::all_groupings(&records))
    };
    let saved = store.save_snapshot(&records, metrics.as_ref())?;
    debug!(connections = saved.connections, metrics = saved.metrics, "snapshot saved");
    store.prune_older_than(config.storage.retention_days)?;

    match scorer.score(&records) {
        ScoreOutcome::Scored(report) => {
            for a in anomaly::annotate(&records, &report).iter().take(LOGGED_ANOMALIES) {
                info!(
                    protocol = %a.record.protocol,
                    src = %a.record.src,
                    dst = %a.record.dst,
                    dport = %a.record.dport,
                    total_bytes = a.record.total_bytes,
                    score = a.anomaly_score,
                    "anomalous connection"
                );
            }
        }
        ScoreOutcome::InsufficientData { required, got } => {
            debug!(required, got, "too few connections to score");
        }
        ScoreOutcome::Failed(_) => {}
    }

    Ok(Some(aggregate::summarize(&records)))
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("CONNTRACK_MONITOR_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = MonitorConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(data_dir = ?config.data_dir, elevated = privilege::is_elevated(), "conntrack monitor starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let store = SnapshotStore::open(&config.db_path())?;
    let collector = ConntrackCollector::new(&config.collectors);
    let scorer = AnomalyScorer::new(&config.anomaly);

    let interval_secs = config.collectors.interval_secs;
    if interval_secs == 0 {
        if let Some(summary) = run_one_cycle(&collector, &store, &scorer, &config)? {
            StructuredLogger::emit_json(&summary, &mut std::io::stdout().lock())?;
        }
        info!("conntrack monitor cycle complete");
        return Ok(());
    }

    info!(interval_secs, "daemon mode (Ctrl+C to stop)");
    static STOP: AtomicBool = AtomicBool::new(false);
    let _ = ctrlc::set_handler(|| {
        STOP.store(true, Ordering::Relaxed);
    });
    let mut cycle: u64 = 0;
    while !STOP.load(Ordering::Relaxed) {
        cycle += 1;
        // cycles run back to back on this thread, so persistence never overlaps
        if let Err(e) = run_one_cycle(&collector, &store, &scorer, &config) {
            warn!(cycle, error = %e, "cycle failed");
        }
        for _ in 0..interval_secs {
            if STOP.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }
    info!("conntrack monitor stopping");
    Ok(())
}
