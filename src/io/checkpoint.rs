use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use super::{tmp_path_for, write_json_atomic};
use crate::error::StoreError;
use crate::models::CheckpointState;

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Persists run progress so an interrupted batch can resume
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    /// Manager for `checkpoint.json` inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CHECKPOINT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last saved state, `None` if there is none
    ///
    /// Only the renamed file counts; a leftover `.tmp` from an interrupted
    /// save is ignored. A checkpoint that exists but does not parse is an error.
    pub fn load(&self) -> Result<Option<CheckpointState>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let state: CheckpointState =
            serde_json::from_str(&text).map_err(|e| StoreError::corrupt(&self.path, e))?;
        debug!(
            "Loaded checkpoint for run {} ({} processed)",
            state.run_id,
            state.processed_count()
        );
        Ok(Some(state))
    }

    pub fn save(&self, state: &CheckpointState) -> Result<(), StoreError> {
        write_json_atomic(&self.path, state)
    }

    /// Move the checkpoint aside after a completed run
    ///
    /// Returns the archive path, or `None` when there was nothing to archive.
    pub fn archive(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let archived = self.path.with_file_name(format!("checkpoint.{stamp}.done.json"));
        std::fs::rename(&self.path, &archived).map_err(|e| StoreError::io(&self.path, e))?;
        info!("Archived checkpoint to {:?}", archived);
        Ok(Some(archived))
    }

    /// Remove the checkpoint and any leftover temp file
    pub fn clear(&self) -> Result<(), StoreError> {
        for path in [self.path.clone(), tmp_path_for(&self.path)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(ids: &[&str]) -> CheckpointState {
        let mut state = CheckpointState::new();
        for (i, id) in ids.iter().enumerate() {
            state.mark_processed(id, i);
        }
        state
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        assert!(manager.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let state = state_with(&["A", "B"]);

        manager.save(&state).unwrap();
        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert!(loaded.is_processed("A"));
        assert!(loaded.is_processed("B"));
        assert_eq!(loaded.last_batch_index, 1);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        manager.save(&state_with(&["A"])).unwrap();

        // Crash between writing the temp file and renaming it
        std::fs::write(tmp_path_for(manager.path()), b"{\"run_id\": \"trunc").unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert!(loaded.is_processed("A"));
        assert_eq!(loaded.processed_count(), 1);

        manager.save(&state_with(&["A", "B"])).unwrap();
        assert_eq!(manager.load().unwrap().unwrap().processed_count(), 2);
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        std::fs::write(manager.path(), b"not json").unwrap();
        assert!(matches!(manager.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_archive_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        assert!(manager.archive().unwrap().is_none());

        manager.save(&state_with(&["A"])).unwrap();
        let archived = manager.archive().unwrap().unwrap();
        assert!(archived.exists());
        assert!(manager.load().unwrap().is_none());

        manager.save(&state_with(&["B"])).unwrap();
        manager.clear().unwrap();
        manager.clear().unwrap();
        assert!(manager.load().unwrap().is_none());
    }
}
