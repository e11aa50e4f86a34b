// Save executor: single-flight persistence with bounded retry.
//
// Cycle states:
//   idle → in flight → saved                 (happy path)
//   in flight → backoff → in flight          (retry, at most `retry_limit` times)
//   in flight → failed                       (retries exhausted, manual retry only)
//   in flight → saved → in flight            (a trigger arrived mid-flight, replay once)
//
// `FlightState` is the critical section: checking and setting `in_flight`
// (or `pending` when it is already set) happen in one `send_modify`, and the
// same watch channel is the completion signal close waits on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use draftkeep_common::types::DocumentId;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::draft::DraftHolder;
use crate::status::StatusBoard;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FlightState {
    in_flight: bool,
    pending: bool,
}

/// What asked for a save. Only close-path retries ignore backoff cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Debounce,
    Manual,
    Close,
    FollowUp,
}

impl SaveTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Manual => "manual",
            Self::Close => "close",
            Self::FollowUp => "follow_up",
        }
    }
}

/// Result of one `attempt_save` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The latest cycle persisted the draft.
    Saved { at: DateTime<Utc> },
    /// Another save was in flight; this request rides on its replay.
    Deferred,
    /// All attempts failed.
    Failed { error: String },
    /// A retry backoff was cut short by close.
    Abandoned,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

pub struct SaveExecutor<S> {
    document_id: DocumentId,
    store: S,
    retry_limit: u32,
    retry_backoff: Duration,
    flight: watch::Sender<FlightState>,
    backoff_cancel: watch::Sender<bool>,
}

impl<S: DocumentStore> SaveExecutor<S> {
    pub fn new(
        document_id: DocumentId,
        store: S,
        retry_limit: u32,
        retry_backoff: Duration,
    ) -> Self {
        let (flight, _) = watch::channel(FlightState::default());
        let (backoff_cancel, _) = watch::channel(false);
        Self { document_id, store, retry_limit, retry_backoff, flight, backoff_cancel }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_in_flight(&self) -> bool {
        self.flight.borrow().in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.flight.borrow().pending
    }

    /// Wait for the in-flight save (if any) to complete, bounded by `limit`.
    /// Returns false if the bound elapsed first.
    pub async fn wait_until_idle(&self, limit: Duration) -> bool {
        let rx = self.flight.subscribe();
        tokio::time::timeout(limit, idle(rx)).await.is_ok()
    }

    /// Cut short any retry backoff that is waiting now or starts later.
    pub fn cancel_backoff(&self) {
        self.backoff_cancel.send_replace(true);
    }

    pub fn resume_backoff(&self) {
        self.backoff_cancel.send_replace(false);
    }

    /// Drop a deferred request so the in-flight save does not replay it.
    pub fn clear_pending(&self) {
        self.flight.send_modify(|state| state.pending = false);
    }

    /// Persist the current draft, or defer if a save is already in flight.
    pub async fn attempt_save(
        &self,
        draft: &DraftHolder,
        status: &StatusBoard,
        trigger: SaveTrigger,
    ) -> SaveOutcome {
        let mut trigger = trigger;
        let mut retry_attempt = 0;

        loop {
            if !self.try_begin() {
                debug!(
                    document_id = %self.document_id,
                    trigger = trigger.as_str(),
                    "save already in flight, deferring"
                );
                return SaveOutcome::Deferred;
            }

            let fields = draft.snapshot();
            status.saving(retry_attempt);
            debug!(
                document_id = %self.document_id,
                trigger = trigger.as_str(),
                retry_attempt,
                "dispatching save"
            );

            match self.store.update_document(self.document_id, &fields).await {
                Ok(_) => {
                    let at = Utc::now();
                    let has_unsaved_changes = draft.mark_persisted(fields);
                    status.saved(at, has_unsaved_changes);
                    let replay = self.finish(true);
                    info!(
                        document_id = %self.document_id,
                        trigger = trigger.as_str(),
                        retry_attempt,
                        has_unsaved_changes,
                        "document saved"
                    );

                    if replay {
                        debug!(
                            document_id = %self.document_id,
                            "replaying save deferred during flight"
                        );
                        trigger = SaveTrigger::FollowUp;
                        retry_attempt = 0;
                        continue;
                    }
                    return SaveOutcome::Saved { at };
                }
                Err(error) => {
                    self.finish(false);

                    if retry_attempt < self.retry_limit {
                        warn!(
                            document_id = %self.document_id,
                            trigger = trigger.as_str(),
                            retry_attempt,
                            retryable = error.is_retryable(),
                            error = %error,
                            "save failed, retrying after backoff"
                        );
                        if !self.backoff(trigger).await {
                            debug!(document_id = %self.document_id, "retry abandoned by close");
                            // The close flush may already own the status.
                            if !self.is_in_flight() {
                                status.abandoned(draft.has_unsaved_changes());
                            }
                            return SaveOutcome::Abandoned;
                        }
                        retry_attempt += 1;
                        continue;
                    }

                    warn!(
                        document_id = %self.document_id,
                        trigger = trigger.as_str(),
                        attempts = retry_attempt + 1,
                        retryable = error.is_retryable(),
                        error = %error,
                        "save failed, giving up until retried manually"
                    );
                    let message = error.to_string();
                    status.failed(message.clone(), draft.has_unsaved_changes());
                    return SaveOutcome::Failed { error: message };
                }
            }
        }
    }

    fn try_begin(&self) -> bool {
        let mut started = false;
        self.flight.send_modify(|state| {
            if state.in_flight {
                state.pending = true;
            } else {
                state.in_flight = true;
                started = true;
            }
        });
        started
    }

    /// Leave the critical section. On success the pending flag is consumed
    /// and returned; on failure it is kept for the next successful cycle.
    fn finish(&self, succeeded: bool) -> bool {
        let mut replay = false;
        self.flight.send_modify(|state| {
            state.in_flight = false;
            if succeeded {
                replay = std::mem::take(&mut state.pending);
            }
        });
        replay
    }

    /// Sleep the retry backoff. Returns false if close cancelled it.
    async fn backoff(&self, trigger: SaveTrigger) -> bool {
        if trigger == SaveTrigger::Close {
            tokio::time::sleep(self.retry_backoff).await;
            return true;
        }

        let cancel = self.backoff_cancel.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.retry_backoff) => true,
            _ = cancelled(cancel) => false,
        }
    }
}

async fn idle(mut rx: watch::Receiver<FlightState>) {
    let _ = rx.wait_for(|state| !state.in_flight).await;
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancel| *cancel).await;
}
