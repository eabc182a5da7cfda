use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Ledger state of a job run.
///
/// `Running` is the only non-terminal state; a run reaches exactly one of
/// the other three and is never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(CoreError::InvalidJobStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every job the pipeline knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    KeywordTelemetry,
    SocialMetrics,
    TrendAggregation,
    KeywordClassification,
    SeasonalTagging,
    ReapStaleRuns,
}

impl JobName {
    pub const ALL: [JobName; 6] = [
        JobName::KeywordTelemetry,
        JobName::SocialMetrics,
        JobName::TrendAggregation,
        JobName::KeywordClassification,
        JobName::SeasonalTagging,
        JobName::ReapStaleRuns,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeywordTelemetry => "keyword-telemetry",
            Self::SocialMetrics => "social-metrics",
            Self::TrendAggregation => "trend-aggregation",
            Self::KeywordClassification => "keyword-classification",
            Self::SeasonalTagging => "seasonal-tagging",
            Self::ReapStaleRuns => "reap-stale-runs",
        }
    }

    /// Feature flag that must be enabled for the job to run, if any.
    #[must_use]
    pub fn gate_flag(self) -> Option<&'static str> {
        match self {
            Self::KeywordTelemetry => Some("user_telemetry_enabled"),
            Self::KeywordClassification => Some("ai_classification_enabled"),
            Self::SocialMetrics
            | Self::TrendAggregation
            | Self::SeasonalTagging
            | Self::ReapStaleRuns => None,
        }
    }
}

impl FromStr for JobName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| CoreError::UnknownJob(s.to_string()))
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_round_trips_through_str() {
        for job in JobName::ALL {
            assert_eq!(job.as_str().parse::<JobName>().unwrap(), job);
        }
    }

    #[test]
    fn unknown_job_name_is_rejected() {
        let err = "keyword-sync".parse::<JobName>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownJob(ref s) if s == "keyword-sync"));
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Skipped.is_terminal());
    }

    #[test]
    fn job_status_parses_stored_values() {
        assert_eq!("skipped".parse::<JobStatus>().unwrap(), JobStatus::Skipped);
        assert!("queued".parse::<JobStatus>().is_err());
    }

    #[test]
    fn telemetry_job_is_gated() {
        assert_eq!(
            JobName::KeywordTelemetry.gate_flag(),
            Some("user_telemetry_enabled")
        );
        assert_eq!(JobName::TrendAggregation.gate_flag(), None);
    }
}
