use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::{read_journal, write_json_atomic};
use crate::llm::Validator;
use crate::models::{DeclinedCall, InsightRecord, Verdict};

pub const INSIGHTS_JSON_FILE: &str = "insights.json";
pub const INSIGHTS_CSV_FILE: &str = "insights.csv";
pub const BATCH_REPORT_FILE: &str = "batch_report.json";
pub const REPORT_FILE: &str = "insights_report.json";

/// Final insights artifact
#[derive(Debug, Clone, Serialize)]
pub struct InsightsFile<'a> {
    pub run_id: Uuid,
    pub records: &'a [InsightRecord],
    pub declined: &'a [DeclinedCall],
}

/// One flattened record in the CSV export
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    call_id: &'a str,
    customer_id: Option<&'a str>,
    city: Option<&'a str>,
    customer_type: Option<&'a str>,
    call_date: Option<String>,
    primary_category: &'a str,
    secondary_categories: String,
    issue_summary: &'a str,
    customer_pain_points: String,
    resolution_status: Option<String>,
    sentiment: String,
    sentiment_shift: Option<String>,
    urgency: Option<String>,
    churn_risk: String,
    exec_empathy_shown: Option<bool>,
    exec_solution_offered: Option<bool>,
    exec_followed_process: Option<bool>,
    exec_escalation_needed: Option<bool>,
    actionable_insight: &'a str,
    keywords: String,
    requires_follow_up: bool,
    follow_up_reason: Option<&'a str>,
}

impl<'a> From<&'a InsightRecord> for CsvRow<'a> {
    fn from(record: &'a InsightRecord) -> Self {
        let metadata = &record.metadata;
        let executive = record.executive_performance;
        Self {
            call_id: &record.call_id,
            customer_id: metadata.customer_id.as_deref(),
            city: metadata.city.as_deref(),
            customer_type: metadata.customer_type.as_ref().map(|t| t.as_str()),
            call_date: metadata.call_date.map(|d| d.to_string()),
            primary_category: record.primary_category.as_str(),
            secondary_categories: record
                .secondary_categories
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            issue_summary: &record.issue_summary,
            customer_pain_points: record.customer_pain_points.join("; "),
            resolution_status: record.resolution_status.map(|s| s.to_string()),
            sentiment: record.sentiment.to_string(),
            sentiment_shift: record.sentiment_shift.map(|s| s.to_string()),
            urgency: record.urgency.map(|u| u.to_string()),
            churn_risk: record.churn_risk.to_string(),
            exec_empathy_shown: executive.map(|e| e.empathy_shown),
            exec_solution_offered: executive.map(|e| e.solution_offered),
            exec_followed_process: executive.map(|e| e.followed_process),
            exec_escalation_needed: executive.map(|e| e.escalation_needed),
            actionable_insight: &record.actionable_insight,
            keywords: record.keywords.join(", "),
            requires_follow_up: record.requires_follow_up,
            follow_up_reason: record.follow_up_reason.as_deref(),
        }
    }
}

/// Write any serializable artifact as pretty JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_json_atomic(path, value).with_context(|| format!("Failed to write {:?}", path))
}

/// Write the flattened CSV export
pub fn write_insights_csv(path: &Path, records: &[InsightRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = csv::Writer::from_writer(std::io::BufWriter::new(file));
    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .with_context(|| format!("Failed to write CSV row for call {}", record.call_id))?;
    }
    writer.flush().context("Failed to flush CSV")?;
    Ok(())
}

#[derive(Deserialize)]
struct StoredInsights {
    records: Vec<Value>,
    #[serde(default)]
    declined: Vec<DeclinedCall>,
}

/// Read insight records back from `insights.json`, a JSON array of records,
/// or an `insights.jsonl` journal
///
/// Every record goes through the validator; invalid ones are logged and
/// skipped.
pub fn read_insights(path: &Path, validator: &Validator<'_>) -> Result<(Vec<InsightRecord>, Vec<DeclinedCall>)> {
    let is_journal = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));
    if is_journal {
        let verdicts = read_journal(path, validator)
            .with_context(|| format!("Failed to read journal {:?}", path))?;
        return Ok(split_verdicts(verdicts));
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let stored = match serde_json::from_str::<Value>(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?
    {
        Value::Array(records) => StoredInsights {
            records,
            declined: Vec::new(),
        },
        other => serde_json::from_value(other)
            .with_context(|| format!("{:?} is neither an insights file nor a record array", path))?,
    };

    let mut records = Vec::with_capacity(stored.records.len());
    for (i, raw) in stored.records.iter().enumerate() {
        match validator.validate(raw) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping record {} in {:?}: {}", i, path, e),
        }
    }
    Ok((records, stored.declined))
}

/// Separate classified records from declines, keeping order
pub fn split_verdicts(verdicts: Vec<Verdict>) -> (Vec<InsightRecord>, Vec<DeclinedCall>) {
    let mut records = Vec::new();
    let mut declined = Vec::new();
    for verdict in verdicts {
        match verdict {
            Verdict::Classified(record) => records.push(record),
            Verdict::Declined(d) => declined.push(d),
        }
    }
    (records, declined)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::CategorySet;

    fn record(categories: &CategorySet) -> InsightRecord {
        let raw = json!({
            "call_id": "101",
            "metadata": {"city": "Surat", "customer_type": "STAR"},
            "primary_category": "LEAD_QUALITY",
            "secondary_categories": ["CHURN_RISK", "SELLER_EDUCATION"],
            "customer_pain_points": ["wrong city", "spam"],
            "sentiment": "NEGATIVE",
            "churn_risk": "HIGH",
            "executive_performance": {
                "empathy_shown": true,
                "solution_offered": false,
                "followed_process": true,
                "escalation_needed": false
            },
            "requires_follow_up": true,
            "follow_up_reason": "check filters"
        });
        Validator::new(categories).validate(&raw).unwrap()
    }

    #[test]
    fn test_csv_flattens_lists_and_executive_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INSIGHTS_CSV_FILE);
        let categories = CategorySet::default();
        write_insights_csv(&path, &[record(&categories)]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();
        let column = |name: &str| {
            let i = headers.iter().position(|h| h == name).unwrap();
            row.get(i).unwrap().to_string()
        };

        assert_eq!(column("call_id"), "101");
        assert_eq!(column("city"), "Surat");
        assert_eq!(column("secondary_categories"), "CHURN_RISK; SELLER_EDUCATION");
        assert_eq!(column("customer_pain_points"), "wrong city; spam");
        assert_eq!(column("exec_empathy_shown"), "true");
        assert_eq!(column("exec_solution_offered"), "false");
        assert_eq!(column("urgency"), "");
    }

    #[test]
    fn test_insights_json_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INSIGHTS_JSON_FILE);
        let categories = CategorySet::default();
        let records = vec![record(&categories)];
        let declined = vec![DeclinedCall {
            call_id: "102".to_string(),
            metadata: Default::default(),
            reason: "silence".to_string(),
        }];
        write_json(
            &path,
            &InsightsFile {
                run_id: Uuid::new_v4(),
                records: &records,
                declined: &declined,
            },
        )
        .unwrap();

        let (read_records, read_declined) =
            read_insights(&path, &Validator::new(&categories)).unwrap();
        assert_eq!(read_records, records);
        assert_eq!(read_declined, declined);
    }

    #[test]
    fn test_invalid_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let categories = CategorySet::default();
        let good = serde_json::to_value(record(&categories)).unwrap();
        let bad = json!({"call_id": "x", "primary_category": "NOPE", "sentiment": "NEUTRAL", "churn_risk": "LOW"});
        std::fs::write(&path, serde_json::to_string(&json!([good, bad])).unwrap()).unwrap();

        let (records, declined) = read_insights(&path, &Validator::new(&categories)).unwrap();
        assert_eq!(records.len(), 1);
        assert!(declined.is_empty());
    }
}
