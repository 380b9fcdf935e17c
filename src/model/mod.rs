//! Unsupervised outlier model: feature standardisation and an isolation forest.

mod isolation;
mod scaler;

pub use isolation::{average_path_length, IsolationForest, IsolationForestParams};
pub use scaler::StandardScaler;
