use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::Classifier;
use crate::error::{BatchError, ClassificationError, StoreError};
use crate::io::{CheckpointManager, RecordJournal};
use crate::llm::{truncate_for_report, CompletionBackend};
use crate::models::{BatchReport, CheckpointState, FailedCall, Transcript, Verdict};

/// Longest raw model output kept in a failure report
pub const MAX_REPORTED_RAW_CHARS: usize = 500;

/// Configuration for batch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Classifications in flight at once
    pub concurrency_limit: usize,
    /// Save the checkpoint after this many recorded verdicts
    pub checkpoint_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            checkpoint_every: 1,
        }
    }
}

/// Result of a batch run
#[derive(Debug)]
pub struct BatchOutput {
    pub report: BatchReport,
    /// Verdicts recorded in this run, in input order
    pub verdicts: Vec<Verdict>,
    /// Final run state
    pub checkpoint: CheckpointState,
}

/// Classifies many transcripts with bounded concurrency and resumable progress
///
/// Workers only classify. The driving loop is the single writer of the
/// journal, the checkpoint and the report.
pub struct BatchRunner<B> {
    classifier: Arc<Classifier<B>>,
    config: BatchConfig,
    checkpoints: Option<CheckpointManager>,
    journal: Option<RecordJournal>,
}

type TaskOutcome = Result<Verdict, ClassificationError>;

impl<B: CompletionBackend + 'static> BatchRunner<B> {
    pub fn new(classifier: Arc<Classifier<B>>, config: BatchConfig) -> Self {
        Self {
            classifier,
            config,
            checkpoints: None,
            journal: None,
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_journal(mut self, journal: RecordJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Classify every transcript not already processed in `state`
    ///
    /// Per-call failures are collected in the report and leave the call
    /// unprocessed. A journal or checkpoint write failure aborts the run.
    pub async fn run(
        &mut self,
        transcripts: &[Transcript],
        mut state: CheckpointState,
    ) -> Result<BatchOutput, BatchError> {
        let started = Instant::now();
        let mut report = BatchReport::new(state.run_id, transcripts.len());

        let pending: Vec<(usize, Transcript)> = transcripts
            .iter()
            .enumerate()
            .filter(|(_, t)| !state.is_processed(&t.call_id))
            .map(|(i, t)| (i, t.clone()))
            .collect();
        report.skipped = transcripts.len() - pending.len();

        info!(
            "Run {}: {} transcripts, {} already processed, {} to classify",
            state.run_id,
            transcripts.len(),
            report.skipped,
            pending.len()
        );

        let mut last_durable = None;
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints
                .save(&state)
                .map_err(|source| persistence(source, &last_durable))?;
            last_durable = Some(state.clone());
        }

        let limit = self.config.concurrency_limit.max(1);
        let checkpoint_every = self.config.checkpoint_every.max(1);
        let total_pending = pending.len();
        let mut queue = pending.into_iter();
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();
        let mut recorded: Vec<(usize, Verdict)> = Vec::new();
        let mut unsaved = 0;

        self.fill(&mut tasks, &mut in_flight, &mut queue, limit);

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    let message = format!("classification task failed: {e}");
                    (e.id(), Err(ClassificationError::TransportFailure { attempts: 0, message }))
                }
            };
            let Some((index, call_id)) = in_flight.remove(&task_id) else {
                warn!("Completion from an untracked task, ignoring");
                continue;
            };

            match outcome {
                Ok(verdict) => {
                    if let Err(source) = self.record(&verdict) {
                        tasks.shutdown().await;
                        return Err(persistence(source, &last_durable));
                    }
                    state.mark_processed(&call_id, index);
                    match &verdict {
                        Verdict::Classified(record) => {
                            report.succeeded += 1;
                            info!(
                                "[{}/{}] Call {}: {}",
                                report.attempted(),
                                total_pending,
                                call_id,
                                record.primary_category
                            );
                        }
                        Verdict::Declined(declined) => {
                            report.declined += 1;
                            info!(
                                "[{}/{}] Call {}: declined ({})",
                                report.attempted(),
                                total_pending,
                                call_id,
                                declined.reason
                            );
                        }
                    }
                    recorded.push((index, verdict));

                    unsaved += 1;
                    if unsaved >= checkpoint_every {
                        if let Err(source) = self.save(&state, &mut last_durable) {
                            tasks.shutdown().await;
                            return Err(persistence(source, &last_durable));
                        }
                        unsaved = 0;
                    }
                }
                Err(e) => {
                    warn!("Call {} failed: {}", call_id, e);
                    let raw_response = match &e {
                        ClassificationError::MalformedResponse { raw, .. } => {
                            Some(truncate_for_report(raw, MAX_REPORTED_RAW_CHARS))
                        }
                        _ => None,
                    };
                    report.record_failure(FailedCall {
                        call_id,
                        kind: e.kind(),
                        message: e.to_string(),
                        raw_response,
                    });
                }
            }

            self.fill(&mut tasks, &mut in_flight, &mut queue, limit);
        }

        self.save(&state, &mut last_durable)
            .map_err(|source| persistence(source, &last_durable))?;

        if report.is_complete() {
            if let Some(checkpoints) = &self.checkpoints {
                // The saved state stays usable if archiving fails
                if let Err(e) = checkpoints.archive() {
                    warn!("Failed to archive checkpoint: {}", e);
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Run {} finished: {} succeeded, {} declined, {} failed, {} skipped in {}ms",
            report.run_id,
            report.succeeded,
            report.declined,
            report.failed,
            report.skipped,
            report.elapsed_ms
        );

        recorded.sort_by_key(|(index, _)| *index);
        Ok(BatchOutput {
            report,
            verdicts: recorded.into_iter().map(|(_, verdict)| verdict).collect(),
            checkpoint: state,
        })
    }

    /// Spawn queued work until `limit` tasks are in flight
    fn fill(
        &self,
        tasks: &mut JoinSet<TaskOutcome>,
        in_flight: &mut HashMap<tokio::task::Id, (usize, String)>,
        queue: &mut impl Iterator<Item = (usize, Transcript)>,
        limit: usize,
    ) {
        while tasks.len() < limit {
            let Some((index, transcript)) = queue.next() else {
                break;
            };
            let classifier = Arc::clone(&self.classifier);
            let call_id = transcript.call_id.clone();
            let handle = tasks.spawn(async move { classifier.classify(&transcript).await });
            in_flight.insert(handle.id(), (index, call_id));
        }
    }

    fn record(&mut self, verdict: &Verdict) -> Result<(), StoreError> {
        match self.journal.as_mut() {
            Some(journal) => journal.append(verdict),
            None => Ok(()),
        }
    }

    fn save(
        &self,
        state: &CheckpointState,
        last_durable: &mut Option<CheckpointState>,
    ) -> Result<(), StoreError> {
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.save(state)?;
            *last_durable = Some(state.clone());
        }
        Ok(())
    }
}

fn persistence(source: StoreError, last_durable: &Option<CheckpointState>) -> BatchError {
    error!("Persistence failure, aborting run: {}", source);
    BatchError::Persistence {
        source,
        last_durable: last_durable.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::EndpointError;
    use crate::io::{read_journal, JOURNAL_FILE};
    use crate::llm::{RetryPolicy, Validator};
    use crate::models::{CategorySet, FailureKind};

    /// Answers per call id (read from the prompt header) and tracks concurrency
    #[derive(Default)]
    struct ByCallId {
        overrides: HashMap<String, String>,
        seen: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ByCallId {
        fn with_override(mut self, call_id: &str, response: &str) -> Self {
            self.overrides.insert(call_id.to_string(), response.to_string());
            self
        }
    }

    #[async_trait]
    impl CompletionBackend for ByCallId {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, EndpointError> {
            let call_id = user
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("# Call: "))
                .unwrap_or_default()
                .to_string();
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.seen.lock().unwrap().push(call_id.clone());
            Ok(self.overrides.get(&call_id).cloned().unwrap_or_else(|| {
                json!({"primary_category": "PAYMENT_BILLING", "sentiment": "NEUTRAL", "churn_risk": "LOW"})
                    .to_string()
            }))
        }
    }

    fn transcripts(ids: &[&str]) -> Vec<Transcript> {
        ids.iter().map(|id| Transcript::new(*id, "payment pending hai")).collect()
    }

    fn classifier(backend: ByCallId) -> Arc<Classifier<ByCallId>> {
        Arc::new(
            Classifier::new(backend, CategorySet::default()).with_retry(RetryPolicy::immediate(3)),
        )
    }

    #[tokio::test]
    async fn test_resume_classifies_only_unprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = classifier(ByCallId::default());
        let mut state = CheckpointState::new();
        state.mark_processed("A", 0);
        state.mark_processed("B", 1);

        let mut runner = BatchRunner::new(Arc::clone(&classifier), BatchConfig::default())
            .with_checkpoints(CheckpointManager::new(dir.path()));
        let output = runner.run(&transcripts(&["A", "B", "C"]), state).await.unwrap();

        assert_eq!(*classifier_backend(&classifier).seen.lock().unwrap(), vec!["C"]);
        assert_eq!(output.report.skipped, 2);
        assert_eq!(output.report.succeeded, 1);
        assert_eq!(output.verdicts.len(), 1);
        assert_eq!(output.checkpoint.processed_count(), 3);
        // Complete run archives the checkpoint
        assert!(CheckpointManager::new(dir.path()).load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ByCallId::default().with_override("B", "this is not json");
        let classifier = classifier(backend);
        let manager = CheckpointManager::new(dir.path());
        let journal = RecordJournal::open(dir.path().join(JOURNAL_FILE), true).unwrap();

        let mut runner = BatchRunner::new(classifier, BatchConfig::default())
            .with_checkpoints(manager.clone())
            .with_journal(journal);
        let output = runner
            .run(&transcripts(&["A", "B", "C"]), CheckpointState::new())
            .await
            .unwrap();

        assert_eq!(output.report.succeeded, 2);
        assert_eq!(output.report.failed, 1);
        let failure = &output.report.failed_calls[0];
        assert_eq!(failure.call_id, "B");
        assert_eq!(failure.kind, FailureKind::MalformedResponse);
        assert_eq!(failure.raw_response.as_deref(), Some("this is not json"));

        // Failed call stays unprocessed and the checkpoint is kept for resume
        let saved = manager.load().unwrap().unwrap();
        assert!(saved.is_processed("A") && saved.is_processed("C"));
        assert!(!saved.is_processed("B"));

        let categories = CategorySet::default();
        let journaled = read_journal(&dir.path().join(JOURNAL_FILE), &Validator::new(&categories)).unwrap();
        let ids: Vec<&str> = journaled.iter().map(|v| v.call_id()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"A") && ids.contains(&"C"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_and_output_ordered() {
        let classifier = classifier(ByCallId::default());
        let config = BatchConfig {
            concurrency_limit: 2,
            checkpoint_every: 1,
        };
        let ids: Vec<String> = (0..8).map(|i| format!("call-{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let mut runner = BatchRunner::new(Arc::clone(&classifier), config);
        let output = runner.run(&transcripts(&id_refs), CheckpointState::new()).await.unwrap();

        assert!(classifier_backend(&classifier).peak.load(Ordering::SeqCst) <= 2);
        let order: Vec<&str> = output.verdicts.iter().map(|v| v.call_id()).collect();
        assert_eq!(order, id_refs);
    }

    /// Records how many calls the saved checkpoint holds when each call starts
    struct WatchesCheckpoint {
        manager: CheckpointManager,
        saved_counts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CompletionBackend for WatchesCheckpoint {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, EndpointError> {
            let saved = self.manager.load().unwrap().map_or(0, |s| s.processed_count());
            self.saved_counts.lock().unwrap().push(saved);
            if user.starts_with("# Call: bad") {
                return Ok("not json".to_string());
            }
            Ok(json!({"primary_category": "PAYMENT_BILLING", "sentiment": "NEUTRAL", "churn_risk": "LOW"})
                .to_string())
        }
    }

    #[tokio::test]
    async fn test_checkpoint_saved_every_n_and_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let backend = WatchesCheckpoint {
            manager: manager.clone(),
            saved_counts: Mutex::new(Vec::new()),
        };
        let classifier = Arc::new(
            Classifier::new(backend, CategorySet::default()).with_retry(RetryPolicy::immediate(1)),
        );
        let config = BatchConfig {
            concurrency_limit: 1,
            checkpoint_every: 2,
        };

        let mut runner = BatchRunner::new(Arc::clone(&classifier), config)
            .with_checkpoints(manager.clone());
        let output = runner
            .run(&transcripts(&["c0", "c1", "c2", "c3", "c4", "bad"]), CheckpointState::new())
            .await
            .unwrap();
        assert_eq!(output.report.succeeded, 5);
        assert_eq!(output.report.failed, 1);

        // Saves land after every second verdict
        assert_eq!(
            *classifier.backend().saved_counts.lock().unwrap(),
            vec![0, 0, 2, 2, 4, 4]
        );
        // The fifth verdict is saved by the final write; the failure keeps the file
        assert_eq!(manager.load().unwrap().unwrap().processed_count(), 5);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut runner = BatchRunner::new(classifier(ByCallId::default()), BatchConfig::default())
            .with_checkpoints(CheckpointManager::new(blocker.join("nested")));
        let err = runner
            .run(&transcripts(&["A"]), CheckpointState::new())
            .await
            .unwrap_err();

        let BatchError::Persistence { last_durable, .. } = err;
        assert!(last_durable.is_none());
    }

    fn classifier_backend(classifier: &Classifier<ByCallId>) -> &ByCallId {
        classifier.backend()
    }
}
