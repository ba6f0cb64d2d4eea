use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::io::{
    split_verdicts, write_insights_csv, write_json, InsightsFile, BATCH_REPORT_FILE,
    INSIGHTS_CSV_FILE, INSIGHTS_JSON_FILE,
};
use crate::models::{BatchReport, DeclinedCall, InsightRecord, Transcript, Verdict};

/// Configuration for rendering run outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Whether to write the flattened CSV next to the JSON
    pub write_csv: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { write_csv: true }
    }
}

/// Files written for a run
#[derive(Debug)]
pub struct RenderResult {
    pub insights_path: PathBuf,
    pub csv_path: Option<PathBuf>,
    pub report_path: PathBuf,
}

/// Merge verdicts from earlier runs with this run's, one per call in input order
///
/// Later verdicts replace earlier ones for the same call. Calls missing from
/// `transcripts` go last, in the order first seen.
pub fn collect_verdicts(
    transcripts: &[Transcript],
    previous: Vec<Verdict>,
    current: Vec<Verdict>,
) -> (Vec<InsightRecord>, Vec<DeclinedCall>) {
    let position: HashMap<&str, usize> = transcripts
        .iter()
        .enumerate()
        .map(|(i, t)| (t.call_id.as_str(), i))
        .collect();

    let mut latest: HashMap<String, (usize, Verdict)> = HashMap::new();
    let mut unknown_order = transcripts.len();
    for verdict in previous.into_iter().chain(current) {
        let order = match latest.get(verdict.call_id()) {
            Some((order, _)) => *order,
            None => position.get(verdict.call_id()).copied().unwrap_or_else(|| {
                unknown_order += 1;
                unknown_order
            }),
        };
        latest.insert(verdict.call_id().to_string(), (order, verdict));
    }

    let mut ordered: Vec<(usize, Verdict)> = latest.into_values().collect();
    ordered.sort_by_key(|(order, _)| *order);
    split_verdicts(ordered.into_iter().map(|(_, verdict)| verdict).collect())
}

/// Write `insights.json`, `insights.csv` and `batch_report.json` to `output_dir`
pub fn render_run(
    output_dir: &Path,
    run_id: Uuid,
    records: &[InsightRecord],
    declined: &[DeclinedCall],
    report: &BatchReport,
    config: &RenderConfig,
) -> Result<RenderResult> {
    let insights_path = output_dir.join(INSIGHTS_JSON_FILE);
    info!(
        "Writing {} records and {} declines to {:?}",
        records.len(),
        declined.len(),
        insights_path
    );
    write_json(
        &insights_path,
        &InsightsFile {
            run_id,
            records,
            declined,
        },
    )?;

    let csv_path = if config.write_csv {
        let path = output_dir.join(INSIGHTS_CSV_FILE);
        info!("Writing CSV export to {:?}", path);
        write_insights_csv(&path, records)?;
        Some(path)
    } else {
        None
    };

    let report_path = output_dir.join(BATCH_REPORT_FILE);
    write_json(&report_path, report)?;

    Ok(RenderResult {
        insights_path,
        csv_path,
        report_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallMetadata;

    fn declined(call_id: &str, reason: &str) -> Verdict {
        Verdict::Declined(DeclinedCall {
            call_id: call_id.to_string(),
            metadata: CallMetadata::default(),
            reason: reason.to_string(),
        })
    }

    #[test]
    fn test_collect_orders_by_input_and_keeps_latest() {
        let transcripts: Vec<_> = ["a", "b", "c"].iter().map(|id| Transcript::new(*id, "x")).collect();
        let previous = vec![declined("c", "old"), declined("zz", "orphan")];
        let current = vec![declined("b", "new"), declined("c", "newer"), declined("a", "first")];

        let (records, declines) = collect_verdicts(&transcripts, previous, current);
        assert!(records.is_empty());
        let summary: Vec<(&str, &str)> = declines
            .iter()
            .map(|d| (d.call_id.as_str(), d.reason.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("a", "first"), ("b", "new"), ("c", "newer"), ("zz", "orphan")]
        );
    }

    #[test]
    fn test_render_run_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let report = BatchReport::new(Uuid::new_v4(), 0);
        let result = render_run(
            dir.path(),
            report.run_id,
            &[],
            &[],
            &report,
            &RenderConfig::default(),
        )
        .unwrap();

        assert!(result.insights_path.exists());
        assert!(result.csv_path.unwrap().exists());
        let written: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(result.report_path).unwrap()).unwrap();
        assert_eq!(written, report);
    }
}
