//! Keyword trend and telemetry aggregation for LexyHub.
//!
//! Sources are fetched concurrently into a trailing window, deduplicated
//! against what is already stored and written through conflict-keyed
//! upserts. Blended trend momentum, intent classification and seasonal
//! labels are merged into one extras section each on the keyword record.
//! Every run leaves a single terminal row in the job run ledger.

pub mod blend;
pub mod classify;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod report;
pub mod sources;
pub mod store;
pub mod upsert;
pub mod window;

mod retry;

pub use blend::{BlendEntry, TrendBlender};
pub use classify::{Classifier, LexiconClassifier, LEXICON_MODEL};
pub use error::{PipelineError, SourceError, StoreError};
pub use jobs::{catalogue, run_named_job, run_named_job_at, JobContext, JobInfo, JobSettings};
pub use ledger::{run_job, JobSummary, SummaryStatus};
pub use report::{FailureEntry, FailureScope, JobReport, WriteReport};
pub use sources::{collect_from_sources, Collected, MetricSource, SourceBatch, SourceFailure};
pub use store::{KeywordRecord, KeywordStore, MemoryStore, PgStore, SignalFeed};
pub use upsert::{MergeOutcome, UpsertCoordinator};
pub use window::TelemetryWindow;
