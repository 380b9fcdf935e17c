//! Acquisition layer: try each source in priority order and keep the first that
//! yields at least one record. Failures fall through; exhaustion yields no records.

pub mod privilege;
mod source;

pub use source::Source;

use crate::config::CollectorsConfig;
use crate::error::SourceError;
use crate::parser::ConnectionRecord;
use std::time::Duration;
use tracing::{debug, warn};

/// A source that was tried and produced nothing.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

/// Outcome of one acquisition pass.
#[derive(Debug, Default)]
pub struct Acquisition {
    pub records: Vec<ConnectionRecord>,
    /// Label of the source that produced `records`
    pub source: Option<String>,
    pub failures: Vec<SourceFailure>,
}

impl Acquisition {
    /// No data and at least one source refused for lack of privileges.
    pub fn requires_elevated_privileges(&self) -> bool {
        self.records.is_empty() && self.failures.iter().any(|f| f.error.is_permission_denied())
    }
}

pub struct ConntrackCollector {
    sources: Vec<Source>,
    timeout: Duration,
}

impl ConntrackCollector {
    pub fn new(config: &CollectorsConfig) -> Self {
        Self::with_sources(
            Source::default_chain(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_sources(sources: Vec<Source>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub async fn acquire_detailed_async(&self) -> Acquisition {
        let mut out = Acquisition::default();
        for source in &self.sources {
            let label = source.label();
            let result = match source.fetch(self.timeout).await {
                Ok(text) => {
                    let records = source.parse(&text);
                    if records.is_empty() {
                        Err(SourceError::NoRecords)
                    } else {
                        Ok(records)
                    }
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(records) => {
                    debug!(source = %label, count = records.len(), "acquired connections");
                    out.records = records;
                    out.source = Some(label);
                    return out;
                }
                Err(error) => {
                    debug!(source = %label, error = %error, "source unavailable, falling through");
                    out.failures.push(SourceFailure { source: label, error });
                }
            }
        }
        warn!(tried = out.failures.len(), "all connection-tracking sources failed");
        out
    }

    pub async fn acquire_async(&self) -> Vec<ConnectionRecord> {
        self.acquire_detailed_async().await.records
    }

    /// Blocking variant. Runs the same chain on a private runtime, so it must not be
    /// called from inside an async context; use [`Self::acquire_detailed_async`] there.
    pub fn acquire_detailed(&self) -> Acquisition {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt.block_on(self.acquire_detailed_async()),
            Err(e) => {
                warn!(error = %e, "could not start acquisition runtime");
                Acquisition::default()
            }
        }
    }

    pub fn acquire(&self) -> Vec<ConnectionRecord> {
        self.acquire_detailed().records
    }
}
