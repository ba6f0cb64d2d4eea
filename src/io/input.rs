use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use crate::models::{parse_call_date, CallMetadata, CustomerType, Transcript};

/// Seed for sample mode, so repeated samples pick the same calls
pub const SAMPLE_SEED: u64 = 42;

const CALL_ID_COLUMNS: &[&str] = &["call_id", "click_to_call_id"];
const CUSTOMER_ID_COLUMNS: &[&str] = &["customer_id", "glid"];
const CITY_COLUMNS: &[&str] = &["city", "city_name"];
const CUSTOMER_TYPE_COLUMNS: &[&str] = &["customer_type"];
const CALL_DATE_COLUMNS: &[&str] = &["call_date", "call_entered_on"];
const TEXT_COLUMNS: &[&str] = &["text", "transcript"];

/// Loaded transcripts in input order, keyed by unique call id
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    transcripts: Vec<Transcript>,
    index: HashMap<String, usize>,
}

impl TranscriptStore {
    /// Build a store, rejecting duplicate call ids
    pub fn from_transcripts(transcripts: Vec<Transcript>) -> Result<Self> {
        let mut index = HashMap::with_capacity(transcripts.len());
        for (i, transcript) in transcripts.iter().enumerate() {
            if index.insert(transcript.call_id.clone(), i).is_some() {
                bail!("duplicate call_id {:?} in transcript source", transcript.call_id);
            }
        }
        Ok(Self { transcripts, index })
    }

    pub fn get(&self, call_id: &str) -> Option<&Transcript> {
        self.index.get(call_id).map(|&i| &self.transcripts[i])
    }

    pub fn transcripts(&self) -> &[Transcript] {
        &self.transcripts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transcript> {
        self.transcripts.iter()
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn call_ids(&self) -> HashSet<String> {
        self.index.keys().cloned().collect()
    }

    /// `n` transcripts chosen with a fixed seed, kept in input order
    pub fn sample(&self, n: usize) -> Vec<Transcript> {
        let n = n.min(self.transcripts.len());
        let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
        let mut picked = rand::seq::index::sample(&mut rng, self.transcripts.len(), n).into_vec();
        picked.sort_unstable();
        picked
            .into_iter()
            .map(|i| self.transcripts[i].clone())
            .collect()
    }
}

/// Load transcripts from a CSV, JSON array or JSON-lines file
///
/// The format follows the extension (`.csv`, `.json`, `.jsonl`/`.ndjson`).
pub fn parse_transcript_file(path: &Path) -> Result<TranscriptStore> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let transcripts = match extension.as_str() {
        "csv" => parse_transcripts_csv(&content),
        "json" | "jsonl" | "ndjson" => parse_transcripts_json(&content),
        other => bail!("unsupported transcript file extension {:?} (expected csv, json or jsonl)", other),
    }
    .with_context(|| format!("Failed to parse transcripts from {:?}", path))?;

    TranscriptStore::from_transcripts(transcripts)
}

/// Parse CSV with a header row
pub fn parse_transcripts_csv(content: &str) -> Result<Vec<Transcript>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut transcripts = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", row + 1))?;
        let fields: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        transcripts.push(transcript_from_fields(&fields, row + 1)?);
    }
    Ok(transcripts)
}

/// Parse a JSON array of objects, or one JSON object per line
pub fn parse_transcripts_json(content: &str) -> Result<Vec<Transcript>> {
    let rows: Vec<Value> = if content.trim_start().starts_with('[') {
        serde_json::from_str(content).context("Failed to parse transcript JSON array")?
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| format!("Invalid JSON on line {}", i + 1))
            })
            .collect::<Result<_>>()?
    };

    rows.iter()
        .enumerate()
        .map(|(row, value)| {
            let obj = value
                .as_object()
                .with_context(|| format!("Row {} is not a JSON object", row + 1))?;
            let fields: HashMap<String, String> = obj
                .iter()
                .filter_map(|(key, value)| scalar_text(value).map(|text| (key.to_lowercase(), text)))
                .collect();
            transcript_from_fields(&fields, row + 1)
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First non-blank value among the column aliases
fn field<'f>(fields: &'f HashMap<String, String>, aliases: &[&str]) -> Option<&'f str> {
    aliases
        .iter()
        .filter_map(|alias| fields.get(*alias))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn transcript_from_fields(fields: &HashMap<String, String>, row: usize) -> Result<Transcript> {
    let call_id = field(fields, CALL_ID_COLUMNS)
        .with_context(|| format!("Row {} has no call_id", row))?
        .to_string();

    let metadata = CallMetadata {
        customer_id: field(fields, CUSTOMER_ID_COLUMNS).map(str::to_string),
        city: field(fields, CITY_COLUMNS).map(str::to_string),
        customer_type: field(fields, CUSTOMER_TYPE_COLUMNS).map(|t| CustomerType::from(t.to_string())),
        call_date: field(fields, CALL_DATE_COLUMNS).and_then(parse_call_date),
    };

    // Keep the text untrimmed; empty text is declined downstream
    let text = TEXT_COLUMNS
        .iter()
        .find_map(|alias| fields.get(*alias).filter(|v| !v.trim().is_empty()))
        .cloned()
        .unwrap_or_default();

    Ok(Transcript::new(call_id, text).with_metadata(metadata))
}
