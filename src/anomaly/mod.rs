//! Anomaly scorer: ranks connections of one batch by isolation-forest score.
//!
//! Scoring is best-effort. Too-small batches and model failures produce an empty
//! report with a reason ([`ScoreOutcome`]) instead of an error.

mod report;
mod scorer;

pub use report::{annotate, select, AnnotatedAnomaly, AnomalyReport, ScoreOutcome, MAX_RESULTS};
pub use scorer::AnomalyScorer;
