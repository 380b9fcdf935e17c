//! Time-series storage for connection and metric snapshots.

mod snapshots;

pub use snapshots::{
    bucket_start, CountBucket, MetricSnapshot, MetricsSnapshot, PruneReport, RowCounts,
    SaveReport, SnapshotStore, TimeBucket,
};
