//! Owner of the fitted scaler/forest pair. The pair is fitted on the first scored
//! batch and reused until a parameter changes; a single lock guards it.

use super::{AnomalyReport, ScoreOutcome};
use crate::config::AnomalyConfig;
use crate::error::ModelError;
use crate::features;
use crate::model::{IsolationForest, IsolationForestParams, StandardScaler};
use crate::parser::ConnectionRecord;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

struct FittedModel {
    scaler: StandardScaler,
    forest: IsolationForest,
}

struct ScorerState {
    contamination: f64,
    n_estimators: usize,
    fitted: Option<FittedModel>,
}

impl ScorerState {
    fn run(&mut self, records: &[ConnectionRecord], random_state: u64) -> Result<AnomalyReport, ModelError> {
        let x = features::feature_matrix(records)?;

        let scaled = match &self.fitted {
            Some(model) => model.scaler.transform(&x)?,
            None => {
                let (scaler, scaled) = StandardScaler::fit_transform(&x)?;
                let params = IsolationForestParams {
                    n_estimators: self.n_estimators,
                    contamination: self.contamination,
                    random_state,
                    ..Default::default()
                };
                let forest = IsolationForest::fit(&scaled, params)?;
                info!(
                    samples = x.nrows(),
                    n_estimators = self.n_estimators,
                    contamination = self.contamination,
                    "anomaly model fitted"
                );
                self.fitted = Some(FittedModel { scaler, forest });
                scaled
            }
        };

        let model = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let scores = model.forest.score_samples(&scaled)?;
        let mut ranked: Vec<usize> = (0..scores.len())
            .filter(|&i| model.forest.is_outlier(scores[i]))
            .collect();
        ranked.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
        Ok(AnomalyReport { ranked, scores })
    }
}

pub struct AnomalyScorer {
    min_records: usize,
    random_state: u64,
    state: Mutex<ScorerState>,
}

impl AnomalyScorer {
    pub fn new(config: &AnomalyConfig) -> Self {
        let contamination = if (0.0..=0.5).contains(&config.contamination) {
            config.contamination
        } else {
            warn!(contamination = config.contamination, "contamination out of range, using 0.1");
            0.1
        };
        Self {
            min_records: config.min_records,
            random_state: config.random_state,
            state: Mutex::new(ScorerState {
                contamination,
                n_estimators: config.n_estimators.max(1),
                fitted: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScorerState> {
        // a panic mid-fit may have left a half-built model behind
        self.state.lock().unwrap_or_else(|poisoned| {
            let mut state = poisoned.into_inner();
            state.fitted = None;
            state
        })
    }

    pub fn contamination(&self) -> f64 {
        self.lock().contamination
    }

    pub fn n_estimators(&self) -> usize {
        self.lock().n_estimators
    }

    pub fn is_fitted(&self) -> bool {
        self.lock().fitted.is_some()
    }

    /// Drop the fitted model; the next call refits.
    pub fn reset(&self) {
        self.lock().fitted = None;
    }

    /// Override parameters. Invalid values are ignored with a warning; the model is
    /// reset only when a value actually changes. Returns whether it was reset.
    pub fn set_params(&self, contamination: Option<f64>, n_estimators: Option<usize>) -> bool {
        let mut state = self.lock();
        let mut changed = false;
        if let Some(c) = contamination {
            if !(0.0..=0.5).contains(&c) {
                warn!(contamination = c, "invalid contamination ignored");
            } else if c != state.contamination {
                state.contamination = c;
                changed = true;
            }
        }
        if let Some(n) = n_estimators {
            if n == 0 {
                warn!("invalid n_estimators 0 ignored");
            } else if n != state.n_estimators {
                state.n_estimators = n;
                changed = true;
            }
        }
        if changed {
            state.fitted = None;
        }
        changed
    }

    /// Score one batch. Never fails: small batches and model errors yield an empty outcome.
    pub fn score(&self, records: &[ConnectionRecord]) -> ScoreOutcome {
        if records.len() < self.min_records {
            return ScoreOutcome::InsufficientData {
                required: self.min_records,
                got: records.len(),
            };
        }
        let mut state = self.lock();
        match state.run(records, self.random_state) {
            Ok(report) => {
                info!(
                    anomalies = report.ranked.len(),
                    total = records.len(),
                    "anomaly detection complete"
                );
                ScoreOutcome::Scored(report)
            }
            Err(e) => {
                error!(error = %e, "anomaly detection failed");
                ScoreOutcome::Failed(e.to_string())
            }
        }
    }
}
