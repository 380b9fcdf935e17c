use crate::parser::ConnectionRecord;
use serde::{Deserialize, Serialize};

/// Hard ceiling on anomalies handed to a consumer.
pub const MAX_RESULTS: usize = 10_000;

/// Flagged indices (most anomalous first) and the score of every input record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub ranked: Vec<usize>,
    /// Same length and order as the scored batch; lower is more anomalous
    pub scores: Vec<f64>,
}

impl AnomalyReport {
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn anomaly_rate(&self) -> f64 {
        if self.scores.is_empty() {
            0.0
        } else {
            self.ranked.len() as f64 / self.scores.len() as f64
        }
    }
}

/// Result of one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(AnomalyReport),
    /// Batch below the minimum size; not scored
    InsufficientData { required: usize, got: usize },
    /// Feature extraction or model failure (already logged)
    Failed(String),
}

impl ScoreOutcome {
    pub fn report(&self) -> Option<&AnomalyReport> {
        match self {
            ScoreOutcome::Scored(r) => Some(r),
            _ => None,
        }
    }

    /// The report, or an empty one when nothing was scored.
    pub fn into_report(self) -> AnomalyReport {
        match self {
            ScoreOutcome::Scored(r) => r,
            _ => AnomalyReport::default(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScoreOutcome::Failed(_))
    }
}

/// A flagged record with its score and position in the scored batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedAnomaly {
    #[serde(flatten)]
    pub record: ConnectionRecord,
    pub anomaly_score: f64,
    pub anomaly_index: usize,
}

/// Copies of the flagged records in ranking order. Out-of-range indices are skipped.
pub fn annotate(records: &[ConnectionRecord], report: &AnomalyReport) -> Vec<AnnotatedAnomaly> {
    report
        .ranked
        .iter()
        .filter_map(|&idx| {
            let mut record = records.get(idx)?.clone();
            record.total_bytes = record.bytes_sent.saturating_add(record.bytes_recv);
            Some(AnnotatedAnomaly {
                record,
                anomaly_score: report.scores.get(idx).copied().unwrap_or(0.0),
                anomaly_index: idx,
            })
        })
        .collect()
}

/// Keep anomalies scoring at or below `max_score`, most anomalous first, capped at
/// `limit` (and never more than [`MAX_RESULTS`]).
pub fn select(
    mut anomalies: Vec<AnnotatedAnomaly>,
    max_score: Option<f64>,
    limit: Option<usize>,
) -> Vec<AnnotatedAnomaly> {
    if let Some(max) = max_score {
        anomalies.retain(|a| a.anomaly_score <= max);
    }
    anomalies.sort_by(|a, b| a.anomaly_score.total_cmp(&b.anomaly_score));
    let cap = limit.filter(|&l| l > 0).unwrap_or(MAX_RESULTS).min(MAX_RESULTS);
    anomalies.truncate(cap);
    anomalies
}
