pub mod config;
pub mod error;
pub mod heuristics;
pub mod io;
pub mod llm;
pub mod models;
pub mod stages;

pub use config::{AppConfig, PathsConfig, DEFAULT_CONFIG_FILE};
pub use error::{BatchError, ClassificationError, EndpointError, StoreError, ValidationError};
pub use io::{
    parse_transcript_file, read_insights, read_journal, CheckpointManager, RecordJournal,
    TranscriptStore,
};
pub use llm::{CompletionBackend, LlmClient, LlmConfig, Provider, RetryPolicy, Validator};
pub use models::{
    AggregateSummary, CategorySet, CheckpointState, GroupKey, InsightRecord, InsightsReport,
    Transcript, Verdict,
};
pub use stages::{
    aggregate, aggregate_with, build_report, collect_verdicts, render_run, AggregateOptions,
    BatchConfig, BatchOutput, BatchRunner, Classifier,
};
