//! End-to-end runs of load, classify, persist and aggregate against a scripted model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use callsight::io::{INSIGHTS_JSON_FILE, JOURNAL_FILE};
use callsight::models::{FailureKind, SystemicIssue};
use callsight::stages::SystemicThresholds;
use callsight::{
    aggregate, build_report, collect_verdicts, parse_transcript_file, read_insights, read_journal,
    render_run, AggregateOptions, BatchConfig, BatchRunner, CategorySet, CheckpointManager,
    CheckpointState, Classifier, CompletionBackend, EndpointError, GroupKey, RecordJournal,
    RetryPolicy, Validator,
};

/// Answers by call id; unknown ids get a billing verdict
#[derive(Default)]
struct ScriptedModel {
    answers: HashMap<String, String>,
    calls: AtomicU32,
    seen: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn answer(mut self, call_id: &str, response: impl ToString) -> Self {
        self.answers.insert(call_id.to_string(), response.to_string());
        self
    }
}

#[async_trait]
impl CompletionBackend for ScriptedModel {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, EndpointError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call_id = user
            .lines()
            .next()
            .and_then(|l| l.strip_prefix("# Call: "))
            .unwrap_or_default()
            .to_string();
        self.seen.lock().unwrap().push(call_id.clone());
        Ok(self.answers.get(&call_id).cloned().unwrap_or_else(|| {
            json!({
                "primary_category": "PAYMENT_BILLING",
                "issue_summary": "Payment reflected late",
                "sentiment": "NEUTRAL",
                "churn_risk": "LOW",
                "requires_follow_up": false
            })
            .to_string()
        }))
    }
}

fn lead_quality_answer() -> serde_json::Value {
    json!({
        "primary_category": "lead_quality",
        "secondary_categories": ["CHURN_RISK"],
        "issue_summary": "Seller receives leads from the wrong city",
        "customer_pain_points": ["irrelevant city leads"],
        "resolution_status": "UNRESOLVED",
        "sentiment": "NEGATIVE",
        "churn_risk": "HIGH",
        "actionable_insight": "Tighten city preferences on lead routing",
        "keywords": ["leads", "city"],
        "requires_follow_up": true,
        "follow_up_reason": "Verify city preference settings"
    })
}

fn write_transcripts(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("calls.json");
    let calls = json!([
        {
            "call_id": "C1",
            "glid": "G100",
            "city": "Jaipur",
            "customer_type": "STAR",
            "call_date": "2024-02-14",
            "text": "ग्राहक ने कहा leads galat city se aa rahi hain"
        },
        {
            "call_id": "C2",
            "glid": "G200",
            "city": "Surat",
            "call_date": "2024-02-15",
            "text": "payment ho gaya par invoice nahi mila"
        },
        {
            "call_id": "C3",
            "city": "Jaipur",
            "text": "   "
        }
    ]);
    std::fs::write(&path, calls.to_string()).unwrap();
    path
}

fn classifier(model: ScriptedModel) -> Arc<Classifier<ScriptedModel>> {
    Arc::new(Classifier::new(model, CategorySet::default()).with_retry(RetryPolicy::immediate(3)))
}

#[tokio::test]
async fn test_full_run_classifies_persists_and_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let store = parse_transcript_file(&write_transcripts(dir.path())).unwrap();
    let output_dir = dir.path().join("output");

    let classifier = classifier(ScriptedModel::default().answer("C1", lead_quality_answer()));
    let journal = RecordJournal::open(output_dir.join(JOURNAL_FILE), true).unwrap();
    let mut runner = BatchRunner::new(Arc::clone(&classifier), BatchConfig::default())
        .with_checkpoints(CheckpointManager::new(dir.path().join("checkpoints")))
        .with_journal(journal);
    let output = runner
        .run(store.transcripts(), CheckpointState::new())
        .await
        .unwrap();

    assert_eq!(output.report.succeeded, 2);
    assert_eq!(output.report.declined, 1);
    assert_eq!(output.report.failed, 0);
    // Blank transcript never reaches the model
    assert_eq!(classifier.backend().calls.load(Ordering::SeqCst), 2);

    let (records, declined) = collect_verdicts(store.transcripts(), Vec::new(), output.verdicts);
    let lead = &records[0];
    assert_eq!(lead.call_id, "C1");
    assert_eq!(lead.primary_category.as_str(), "LEAD_QUALITY");
    assert_eq!(lead.metadata.city.as_deref(), Some("Jaipur"));
    assert_eq!(lead.metadata.customer_id.as_deref(), Some("G100"));
    assert_eq!(declined[0].call_id, "C3");

    render_run(
        &output_dir,
        output.report.run_id,
        &records,
        &declined,
        &output.report,
        &Default::default(),
    )
    .unwrap();

    let categories = CategorySet::default();
    let validator = Validator::new(&categories);
    let (reloaded, reloaded_declined) =
        read_insights(&output_dir.join(INSIGHTS_JSON_FILE), &validator).unwrap();
    assert_eq!(reloaded, records);
    assert_eq!(reloaded_declined.len(), 1);

    let by_city = aggregate(&reloaded, GroupKey::City);
    let jaipur = by_city.group("Jaipur").unwrap();
    assert_eq!(jaipur.count, 1);
    assert_eq!(jaipur.follow_up_rate, 1.0);
    assert_eq!(by_city.group("Surat").unwrap().count, 1);

    let report = build_report(
        &reloaded,
        &reloaded_declined,
        &categories,
        &AggregateOptions::default(),
        &SystemicThresholds::default(),
    );
    assert_eq!(report.overview.total_calls, 2);
    assert_eq!(report.overview.declined_calls, 1);
    assert_eq!(report.overview.unique_cities, 2);
    let shares: Vec<(&str, usize)> = report
        .categories
        .iter()
        .map(|s| (s.category.as_str(), s.count))
        .collect();
    assert_eq!(shares, vec![("LEAD_QUALITY", 1), ("PAYMENT_BILLING", 1)]);
    assert!(report
        .systemic_issues
        .iter()
        .all(|issue| !matches!(issue, SystemicIssue::HighChurnSegment { .. })));
}

#[tokio::test]
async fn test_resume_after_failures_retries_only_unprocessed() {
    let dir = tempfile::tempdir().unwrap();
    let store = parse_transcript_file(&write_transcripts(dir.path())).unwrap();
    let checkpoint_dir = dir.path().join("checkpoints");
    let journal_path = dir.path().join("output").join(JOURNAL_FILE);

    // First run: C2 keeps answering garbage
    let first = classifier(ScriptedModel::default().answer("C2", "I am not JSON"));
    let mut runner = BatchRunner::new(Arc::clone(&first), BatchConfig::default())
        .with_checkpoints(CheckpointManager::new(&checkpoint_dir))
        .with_journal(RecordJournal::open(&journal_path, true).unwrap());
    let output = runner
        .run(store.transcripts(), CheckpointState::new())
        .await
        .unwrap();

    assert_eq!(output.report.failed, 1);
    let failure = &output.report.failed_calls[0];
    assert_eq!(failure.call_id, "C2");
    assert_eq!(failure.kind, FailureKind::MalformedResponse);
    assert_eq!(failure.raw_response.as_deref(), Some("I am not JSON"));
    // One attempt for C1, three for C2, none for the blank C3
    assert_eq!(first.backend().calls.load(Ordering::SeqCst), 4);

    // Incomplete run keeps its checkpoint
    let checkpoints = CheckpointManager::new(&checkpoint_dir);
    let saved = checkpoints.load().unwrap().unwrap();
    assert_eq!(saved.processed_count(), 2);
    assert!(saved.is_processed("C1"));
    assert!(!saved.is_processed("C2"));

    // Second run resumes with a healthy model
    let categories = CategorySet::default();
    let known = store.call_ids();
    let validator = Validator::new(&categories).with_known_calls(&known);
    let previous = read_journal(&journal_path, &validator).unwrap();
    assert_eq!(previous.len(), 2);

    let second = classifier(ScriptedModel::default());
    let mut runner = BatchRunner::new(Arc::clone(&second), BatchConfig::default())
        .with_checkpoints(CheckpointManager::new(&checkpoint_dir))
        .with_journal(RecordJournal::open(&journal_path, false).unwrap());
    let output = runner.run(store.transcripts(), saved).await.unwrap();

    assert_eq!(*second.backend().seen.lock().unwrap(), vec!["C2"]);
    assert_eq!(output.report.skipped, 2);
    assert_eq!(output.report.succeeded, 1);
    assert!(checkpoints.load().unwrap().is_none());

    let (records, declined) = collect_verdicts(store.transcripts(), previous, output.verdicts);
    let ids: Vec<&str> = records.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, vec!["C1", "C2"]);
    assert_eq!(declined.len(), 1);

    // Journal now holds every call exactly once
    assert_eq!(read_journal(&journal_path, &validator).unwrap().len(), 3);
}

#[tokio::test]
async fn test_aggregation_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let store = parse_transcript_file(&write_transcripts(dir.path())).unwrap();

    let classifier = classifier(ScriptedModel::default().answer("C1", lead_quality_answer()));
    let mut runner = BatchRunner::new(classifier, BatchConfig::default());
    let output = runner
        .run(store.transcripts(), CheckpointState::new())
        .await
        .unwrap();
    let (records, _) = collect_verdicts(store.transcripts(), Vec::new(), output.verdicts);

    for group_by in [GroupKey::Category, GroupKey::Week, GroupKey::Segment] {
        let first = serde_json::to_string(&aggregate(&records, group_by)).unwrap();
        let second = serde_json::to_string(&aggregate(&records, group_by)).unwrap();
        assert_eq!(first, second);
    }

    let by_category = aggregate(&records, GroupKey::Category);
    let keys: Vec<&str> = by_category.groups.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["LEAD_QUALITY", "PAYMENT_BILLING"]);
}
