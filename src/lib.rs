//! Conntrack monitor — connection-tracking table ingestion, aggregation, history and
//! anomaly scoring.
//!
//! Modular structure:
//! - [`parser`] — Raw conntrack text (tool output, pseudo-files) into records
//! - [`collectors`] — Source fallback chain with timeouts
//! - [`aggregate`] — Counts, rankings, cross-tabs and byte groupings
//! - [`storage`] — SQLite time-series snapshots
//! - [`features`] — Batch-normalised feature rows
//! - [`model`] — Scaler and isolation forest
//! - [`anomaly`] — Anomaly scorer owning the fitted model
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod error;
pub mod parser;
pub mod collectors;
pub mod aggregate;
pub mod storage;
pub mod features;
pub mod model;
pub mod anomaly;
pub mod logging;

pub use config::MonitorConfig;
pub use parser::ConnectionRecord;
pub use collectors::{Acquisition, ConntrackCollector, Source};
pub use aggregate::{AggregateBucket, ConnectionSummary, Dimension, Groupings};
pub use storage::SnapshotStore;
pub use anomaly::{AnomalyReport, AnomalyScorer, ScoreOutcome};
pub use logging::StructuredLogger;
