//! Per-connection feature construction for the outlier model.
//!
//! Each record becomes a fixed 7-wide row; byte, port and frequency features are
//! normalised against statistics of the whole batch, computed once per call.

mod connection;

pub use connection::{feature_matrix, feature_rows, protocol_code, state_code, BatchStats};

/// Width of one feature row
pub const FEATURE_DIM: usize = 7;

/// Column order of the feature matrix
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "protocol",
    "state",
    "bytes_sent",
    "bytes_recv",
    "total_bytes",
    "dport",
    "ip_uniqueness",
];
