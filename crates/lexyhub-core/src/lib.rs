//! Domain types shared by every LexyHub crate.
//!
//! Holds the keyword model and its typed `extras` sections, the stat/trend
//! row shapes written by the aggregation jobs, the score normalizer and the
//! environment-driven [`AppConfig`].

mod app_config;
mod config;
pub mod extras;
pub mod job;
pub mod keyword;
pub mod records;
pub mod score;
pub mod seasonal;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use extras::{
    Classification, ExtrasSection, KeywordExtras, KeywordIntent, SeasonalLabel, SectionKind,
    TrendDetail,
};
pub use job::{JobName, JobStatus};
pub use keyword::{normalize_term, DerivedScalars, DEFAULT_MARKET};
pub use records::{NewKeywordStat, NewTrendPoint, StatKey, TrendKey};
pub use score::{normalize_score, round4, TrendIndicator, DEFAULT_FALLBACK};
pub use seasonal::SeasonalPeriod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("invalid job status: {0}")]
    InvalidJobStatus(String),
    #[error("empty keyword term")]
    EmptyTerm,
}
