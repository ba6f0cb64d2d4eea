use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error class of a call that could not be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransportFailure,
    MalformedResponse,
    ValidationError,
}

/// A call whose classification failed after retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCall {
    pub call_id: String,
    pub kind: FailureKind,
    pub message: String,
    /// Truncated raw model output, for malformed responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Outcome summary of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Transcripts handed to the runner
    pub total: usize,
    /// Already processed according to the checkpoint
    pub skipped: usize,
    pub succeeded: usize,
    pub declined: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub failed_calls: Vec<FailedCall>,
}

impl BatchReport {
    pub fn new(run_id: Uuid, total: usize) -> Self {
        Self {
            run_id,
            total,
            skipped: 0,
            succeeded: 0,
            declined: 0,
            failed: 0,
            elapsed_ms: 0,
            failed_calls: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, failure: FailedCall) {
        self.failed += 1;
        self.failed_calls.push(failure);
    }

    /// Calls attempted in this run
    pub fn attempted(&self) -> usize {
        self.succeeded + self.declined + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}
