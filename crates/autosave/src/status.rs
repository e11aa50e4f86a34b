use chrono::{DateTime, Utc};
use draftkeep_common::status::SaveStatus;
use tokio::sync::watch;

/// Publishes save status transitions to any number of observers.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<SaveStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SaveStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SaveStatus {
        self.tx.borrow().clone()
    }

    pub fn edited(&self, has_unsaved_changes: bool) {
        self.tx.send_modify(|status| status.record_edit(has_unsaved_changes));
    }

    pub fn saving(&self, retry_attempt: u32) {
        self.tx.send_modify(|status| status.record_attempt(retry_attempt));
    }

    pub fn saved(&self, at: DateTime<Utc>, has_unsaved_changes: bool) {
        self.tx.send_modify(|status| status.record_saved(at, has_unsaved_changes));
    }

    pub fn failed(&self, error: String, has_unsaved_changes: bool) {
        self.tx.send_modify(|status| status.record_failed(error, has_unsaved_changes));
    }

    pub fn abandoned(&self, has_unsaved_changes: bool) {
        self.tx.send_modify(|status| status.record_abandoned(has_unsaved_changes));
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}
