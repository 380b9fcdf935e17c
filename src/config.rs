//! Monitor configuration. JSON file, every section has defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Data directory (snapshot database)
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    pub db_file: String,
    /// Acquisition sources and collection cadence
    pub collectors: CollectorsConfig,
    /// Outlier model parameters
    pub anomaly: AnomalyConfig,
    /// History retention
    pub storage: StorageConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// Connection-tracking listing tool
    pub command: String,
    /// Per-source timeout (seconds)
    pub timeout_secs: u64,
    /// Pseudo-files tried after the tool, in order
    pub proc_paths: Vec<PathBuf>,
    /// Collection interval (seconds); 0 runs a single cycle
    pub interval_secs: u64,
    /// Above this many records a cycle stores raw rows only
    pub max_metrics_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Expected outlier fraction, 0.0–0.5
    pub contamination: f64,
    /// Ensemble size
    pub n_estimators: usize,
    /// Seed for tree construction
    pub random_state: u64,
    /// Batches smaller than this are not scored
    pub min_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".conntrack-monitor"),
            db_file: "conntrack.db".to_string(),
            collectors: CollectorsConfig::default(),
            anomaly: AnomalyConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            command: "conntrack".to_string(),
            timeout_secs: 5,
            proc_paths: vec![
                PathBuf::from("/proc/net/nf_conntrack"),
                PathBuf::from("/proc/net/ip_conntrack"),
            ],
            interval_secs: 30,
            max_metrics_records: 50_000,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            random_state: 42,
            min_records: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { retention_days: 7 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl MonitorConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<MonitorConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}
