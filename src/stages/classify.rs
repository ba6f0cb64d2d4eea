use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ClassificationError, EndpointError};
use crate::llm::{
    build_classification_prompt, parse_model_json, CompletionBackend, RetryDecision, RetryPolicy,
    Validator, SYSTEM_PROMPT,
};
use crate::models::{CategorySet, DeclinedCall, Transcript, Verdict};

/// Reason recorded for transcripts with no text
pub const EMPTY_TRANSCRIPT_REASON: &str = "empty transcript";

/// Turns one transcript into a validated verdict
///
/// One classification is: build prompt, call the endpoint, parse, validate.
/// Endpoint and parse failures share one attempt limit; validation failures
/// are final.
pub struct Classifier<B> {
    backend: B,
    categories: CategorySet,
    retry: RetryPolicy,
}

/// Why a single attempt failed
enum AttemptError {
    Endpoint(EndpointError),
    Malformed { message: String, raw: String },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Endpoint(e) => write!(f, "{e}"),
            AttemptError::Malformed { message, .. } => write!(f, "malformed response: {message}"),
        }
    }
}

impl<B: CompletionBackend> Classifier<B> {
    pub fn new(backend: B, categories: CategorySet) -> Self {
        Self {
            backend,
            categories,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn classify(&self, transcript: &Transcript) -> Result<Verdict, ClassificationError> {
        if !transcript.has_text() {
            info!("Call {}: empty transcript, declining", transcript.call_id);
            return Ok(Verdict::Declined(DeclinedCall {
                call_id: transcript.call_id.clone(),
                metadata: transcript.metadata.clone(),
                reason: EMPTY_TRANSCRIPT_REASON.to_string(),
            }));
        }

        let prompt = build_classification_prompt(transcript, &self.categories);
        let backend = &self.backend;
        let prompt = prompt.as_str();
        let call_id = transcript.call_id.as_str();

        let outcome = self
            .retry
            .run(
                move |attempt| async move {
                    let text = backend
                        .complete(SYSTEM_PROMPT, prompt)
                        .await
                        .map_err(AttemptError::Endpoint)?;
                    debug!("Call {} attempt {}: response {:?}", call_id, attempt, text);
                    parse_model_json(&text).map_err(|message| AttemptError::Malformed {
                        message,
                        raw: text,
                    })
                },
                |error| match error {
                    AttemptError::Endpoint(e) if e.is_retryable() => RetryDecision::Retry {
                        at_least: e.retry_after_secs().map(Duration::from_secs),
                    },
                    AttemptError::Endpoint(_) => RetryDecision::Stop,
                    AttemptError::Malformed { .. } => RetryDecision::Retry { at_least: None },
                },
            )
            .await;

        let value = outcome.map_err(|exhausted| match exhausted.last_error {
            AttemptError::Endpoint(e) => ClassificationError::TransportFailure {
                attempts: exhausted.attempts,
                message: e.to_string(),
            },
            AttemptError::Malformed { message, raw } => ClassificationError::MalformedResponse {
                attempts: exhausted.attempts,
                message,
                raw,
            },
        })?;

        self.to_verdict(transcript, value)
    }

    /// Validate model output against the transcript it was produced for
    ///
    /// The call id and metadata always come from the transcript; whatever the
    /// model wrote for them is discarded.
    fn to_verdict(
        &self,
        transcript: &Transcript,
        mut value: Value,
    ) -> Result<Verdict, ClassificationError> {
        if let Some(obj) = value.as_object_mut() {
            obj.insert("call_id".to_string(), Value::String(transcript.call_id.clone()));
            obj.remove("metadata");
        }

        let mut verdict = Validator::new(&self.categories).validate_verdict(&value)?;
        match &mut verdict {
            Verdict::Classified(record) => record.metadata = transcript.metadata.clone(),
            Verdict::Declined(declined) => declined.metadata = transcript.metadata.clone(),
        }
        Ok(verdict)
    }
}
