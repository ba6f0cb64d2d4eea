//! Error types for the classification pipeline.
//!
//! Per-call errors ([`ValidationError`], [`ClassificationError`]) are recorded and
//! the batch continues; persistence errors ([`StoreError`], [`BatchError`]) abort
//! the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{CheckpointState, FailureKind};

/// A parsed response that does not satisfy the insight record schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {value:?}")]
    InvalidEnumValue { field: String, value: String },

    #[error("field {field} must be {expected}")]
    InvalidType { field: String, expected: &'static str },

    #[error("field {field} exceeds {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("follow_up_reason must be present iff requires_follow_up is true (requires_follow_up = {requires_follow_up})")]
    FollowUpMismatch { requires_follow_up: bool },

    #[error("call_id {0} does not reference a known transcript")]
    UnknownCallId(String),
}

/// Failure talking to the LLM endpoint
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    #[error("endpoint returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Seconds from a `Retry-After` header, if any
        retry_after_secs: Option<u64>,
    },

    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },
}

impl EndpointError {
    /// Rate limits, timeouts and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            EndpointError::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            EndpointError::Transport { retryable, .. } => *retryable,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            EndpointError::Status { retry_after_secs, .. } => *retry_after_secs,
            EndpointError::Transport { .. } => None,
        }
    }
}

/// Why a single call could not be classified
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("transport failure after {attempts} attempt(s): {message}")]
    TransportFailure { attempts: u32, message: String },

    #[error("malformed response after {attempts} attempt(s): {message}")]
    MalformedResponse {
        attempts: u32,
        message: String,
        /// Raw model output of the last attempt
        raw: String,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl ClassificationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClassificationError::TransportFailure { .. } => FailureKind::TransportFailure,
            ClassificationError::MalformedResponse { .. } => FailureKind::MalformedResponse,
            ClassificationError::Validation(_) => FailureKind::ValidationError,
        }
    }
}

/// Flat-file persistence failure (checkpoint, journal, outputs)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt data in {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            source,
        }
    }
}

/// Fatal batch run failure
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("persistence failed, run aborted: {source}")]
    Persistence {
        #[source]
        source: StoreError,
        /// The last checkpoint known to be on disk
        last_durable: Option<CheckpointState>,
    },
}
