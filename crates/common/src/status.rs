// Observable save status of an editing session.
//
// Transitions:
//   Idle/Saved → Dirty      (edit that diverges from the baseline)
//   * → Saving               (attempt dispatched, also held during retry backoff)
//   Saving → Saved | Failed  (attempt outcome)
//   Failed → Dirty           (edit after a persistent failure clears the error)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Idle,
    Dirty,
    Saving,
    Saved,
    Failed,
}

impl SaveState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dirty => "dirty",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SaveStatus {
    pub state: SaveState,
    pub is_saving: bool,
    pub has_unsaved_changes: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Present only in `Failed`.
    pub last_error: Option<String>,
    /// 0 on a first attempt, 1..=retry_limit while retrying.
    pub retry_attempt: u32,
}

impl SaveStatus {
    /// Whether the host should warn before an abrupt shutdown.
    pub fn needs_unload_guard(&self) -> bool {
        self.has_unsaved_changes || self.is_saving
    }

    pub fn record_edit(&mut self, has_unsaved_changes: bool) {
        self.has_unsaved_changes = has_unsaved_changes;
        if self.is_saving {
            return;
        }
        self.last_error = None;
        self.state = if has_unsaved_changes {
            SaveState::Dirty
        } else if self.last_saved_at.is_some() {
            SaveState::Saved
        } else {
            SaveState::Idle
        };
    }

    pub fn record_attempt(&mut self, retry_attempt: u32) {
        self.state = SaveState::Saving;
        self.is_saving = true;
        self.last_error = None;
        self.retry_attempt = retry_attempt;
    }

    pub fn record_saved(&mut self, at: DateTime<Utc>, has_unsaved_changes: bool) {
        self.state = SaveState::Saved;
        self.is_saving = false;
        self.has_unsaved_changes = has_unsaved_changes;
        self.last_saved_at = Some(at);
        self.last_error = None;
        self.retry_attempt = 0;
    }

    pub fn record_failed(&mut self, error: String, has_unsaved_changes: bool) {
        self.state = SaveState::Failed;
        self.is_saving = false;
        self.has_unsaved_changes = has_unsaved_changes;
        self.last_error = Some(error);
    }

    /// A retry was abandoned before it was dispatched.
    pub fn record_abandoned(&mut self, has_unsaved_changes: bool) {
        self.is_saving = false;
        self.retry_attempt = 0;
        self.record_edit(has_unsaved_changes);
    }
}
