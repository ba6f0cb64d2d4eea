use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted progress of a batch classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub run_id: Uuid,
    /// Calls with a recorded verdict (classified or declined)
    pub processed_call_ids: BTreeSet<String>,
    /// Highest input position with a recorded verdict
    pub last_batch_index: usize,
    pub run_started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    /// Fresh state for a new run
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            processed_call_ids: BTreeSet::new(),
            last_batch_index: 0,
            run_started_at: now,
            updated_at: now,
        }
    }

    pub fn is_processed(&self, call_id: &str) -> bool {
        self.processed_call_ids.contains(call_id)
    }

    /// Record a verdict for the call at `index` in the input sequence
    pub fn mark_processed(&mut self, call_id: &str, index: usize) {
        self.processed_call_ids.insert(call_id.to_string());
        self.last_batch_index = self.last_batch_index.max(index);
        self.updated_at = Utc::now();
    }

    pub fn processed_count(&self) -> usize {
        self.processed_call_ids.len()
    }
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_processed_tracks_highest_index() {
        let mut state = CheckpointState::new();
        state.mark_processed("b", 4);
        state.mark_processed("a", 2);
        assert!(state.is_processed("a"));
        assert!(state.is_processed("b"));
        assert!(!state.is_processed("c"));
        assert_eq!(state.last_batch_index, 4);
        assert_eq!(state.processed_count(), 2);
    }

    #[test]
    fn test_checkpoint_json_shape() {
        let mut state = CheckpointState::new();
        state.mark_processed("101", 0);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["processed_call_ids"], serde_json::json!(["101"]));
        assert_eq!(json["last_batch_index"], 0);
        assert!(json["run_started_at"].is_string());

        let back: CheckpointState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
