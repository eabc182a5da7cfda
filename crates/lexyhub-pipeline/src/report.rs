//! Counters and failure entries accumulated by a job body.

use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::sources::SourceFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureScope {
    /// A whole data source could not be fetched.
    Source,
    /// Writes for one keyword failed.
    Keyword,
    /// Writes for one trend term failed.
    Term,
}

/// One isolated failure that did not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub scope: FailureScope,
    pub key: String,
    pub error: String,
}

impl From<SourceFailure> for FailureEntry {
    fn from(failure: SourceFailure) -> Self {
        Self {
            scope: FailureScope::Source,
            key: failure.source,
            error: failure.error,
        }
    }
}

/// Outcome counters of the upsert coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteReport {
    /// Rows inserted or updated, plus keyword records written.
    pub written: u64,
    /// Trend rows that replaced an already-stored point.
    pub refreshed: u64,
    /// Candidate rows dropped because their key already exists.
    pub skipped_existing: u64,
    /// Keyword merges that changed nothing and were not written.
    pub unchanged: u64,
    pub failed: u64,
    pub failures: Vec<FailureEntry>,
}

impl WriteReport {
    pub fn fail(&mut self, scope: FailureScope, key: impl Into<String>, error: &dyn Display) {
        self.failed += 1;
        self.failures.push(FailureEntry {
            scope,
            key: key.into(),
            error: error.to_string(),
        });
    }

    pub fn absorb(&mut self, other: WriteReport) {
        self.written += other.written;
        self.refreshed += other.refreshed;
        self.skipped_existing += other.skipped_existing;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

/// What a job body hands back to the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub processed: u64,
    pub failures: Vec<FailureEntry>,
    pub metadata: Map<String, Value>,
}

impl JobReport {
    /// Fold a write report into the job report: `written` counts as
    /// processed and the counters land in metadata.
    #[must_use]
    pub fn from_writes(writes: WriteReport) -> Self {
        let mut report = Self {
            processed: writes.written,
            ..Self::default()
        };
        report.set("written", writes.written);
        report.set("refreshed", writes.refreshed);
        report.set("skipped_existing", writes.skipped_existing);
        report.set("unchanged", writes.unchanged);
        report.set("failed", writes.failed);
        report.failures = writes.failures;
        report
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn add_source_failures(&mut self, failures: Vec<SourceFailure>) {
        // Source failures come first so they read in fetch order.
        let mut merged: Vec<FailureEntry> = failures.into_iter().map(FailureEntry::from).collect();
        merged.append(&mut self.failures);
        self.failures = merged;
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
