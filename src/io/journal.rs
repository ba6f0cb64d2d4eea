use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::llm::Validator;
use crate::models::Verdict;

pub const JOURNAL_FILE: &str = "insights.jsonl";

/// Append-only JSON-lines log of verdicts
///
/// Each verdict is flushed and synced before the checkpoint that marks its call
/// processed is saved, so every processed call has a journal line.
#[derive(Debug)]
pub struct RecordJournal {
    path: PathBuf,
    file: File,
}

impl RecordJournal {
    /// Open for appending; `fresh` truncates any previous run's journal
    ///
    /// When appending, a partial last line left by a crash is cut off first so
    /// the next verdict starts on its own line.
    pub fn open(path: impl Into<PathBuf>, fresh: bool) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if fresh {
            options.write(true).truncate(true);
        } else {
            trim_torn_tail(&path)?;
            options.append(true);
        }
        let file = options.open(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, verdict: &Verdict) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(verdict).map_err(|e| StoreError::corrupt(&self.path, e))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

/// Cut the file back to its last complete line
fn trim_torn_tail(path: &Path) -> Result<(), StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    if bytes.last().is_none_or(|&b| b == b'\n') {
        return Ok(());
    }

    let keep = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    warn!(
        "Dropping {} bytes of a torn line at the end of {:?}",
        bytes.len() - keep,
        path
    );
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.set_len(keep as u64)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io(path, e))
}

/// Read every verdict back from a journal, re-validating each record
///
/// Lines that do not parse or validate (e.g. a line torn by a crash) are
/// logged and skipped. A missing journal reads as empty.
pub fn read_journal(path: &Path, validator: &Validator<'_>) -> Result<Vec<Verdict>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut verdicts = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line, validator) {
            Ok(verdict) => verdicts.push(verdict),
            Err(e) => warn!("Skipping {:?} line {}: {}", path, line_no + 1, e),
        }
    }
    Ok(verdicts)
}

fn parse_line(line: &str, validator: &Validator<'_>) -> anyhow::Result<Verdict> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("outcome").and_then(Value::as_str) == Some("declined") {
        return Ok(Verdict::Declined(validator.validate_declined(&value)?));
    }
    Ok(Verdict::Classified(validator.validate(&value)?))
}
