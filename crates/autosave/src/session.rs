// Editing session: the host-facing autosave controller for one document.
//
// Edits land in the draft synchronously and re-arm the debounce timer. When
// the timer fires the executor persists whatever the draft holds at that
// instant. Close drains the in-flight save, flushes unsaved work and only
// discards it with the host's explicit consent.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use draftkeep_common::edit::{FieldEdit, FieldName, FieldParseError};
use draftkeep_common::status::SaveStatus;
use draftkeep_common::types::{Document, DocumentId, DraftFields};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AutosavePolicy;
use crate::draft::DraftHolder;
use crate::executor::{SaveExecutor, SaveOutcome, SaveTrigger};
use crate::scheduler::DebounceTimer;
use crate::status::StatusBoard;
use crate::store::{DocumentStore, StoreError};
use crate::unload::{UnloadGuard, UnloadHook};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("editing session for document {0} is closed")]
    Closed(DocumentId),

    #[error("could not open document: {0}")]
    Open(#[from] StoreError),

    #[error(transparent)]
    Field(#[from] FieldParseError),
}

/// Host answer to "the final save failed, discard unsaved changes?".
pub trait CloseConfirmer: Send + Sync {
    fn confirm_discard(&self, reason: &str) -> impl Future<Output = bool> + Send;
}

/// Confirmer with a fixed answer, for hosts that decide up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl CloseConfirmer for FixedAnswer {
    async fn confirm_discard(&self, _reason: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed(CloseReport),
    /// The host declined to discard unsaved work; the session stays open.
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    /// The close-wait bound elapsed while a save was still in flight.
    pub wait_timed_out: bool,
    /// Outcome of the flush save, if unsaved changes remained.
    pub final_save: Option<SaveOutcome>,
    pub discarded_unsaved: bool,
}

pub struct EditingSession<S: DocumentStore> {
    inner: Arc<SessionInner<S>>,
}

impl<S: DocumentStore> Clone for EditingSession<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct SessionInner<S> {
    document_id: DocumentId,
    policy: AutosavePolicy,
    draft: DraftHolder,
    status: StatusBoard,
    executor: SaveExecutor<S>,
    timer: Mutex<DebounceTimer>,
    close_lock: tokio::sync::Mutex<()>,
    /// Set while `close` drains and flushes; the flush owns all saving.
    closing: AtomicBool,
    closed: AtomicBool,
    unload: Mutex<Option<UnloadGuard>>,
}

impl<S: DocumentStore> EditingSession<S> {
    /// Open a session on a document that is already loaded.
    pub fn open_with(store: S, document: Document, policy: AutosavePolicy) -> Self {
        let document_id = document.id;
        info!(%document_id, "editing session opened");
        Self {
            inner: Arc::new(SessionInner {
                document_id,
                policy,
                draft: DraftHolder::new(document.fields),
                status: StatusBoard::new(),
                executor: SaveExecutor::new(
                    document_id,
                    store,
                    policy.retry_limit,
                    policy.retry_backoff,
                ),
                timer: Mutex::new(DebounceTimer::new()),
                close_lock: tokio::sync::Mutex::new(()),
                closing: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                unload: Mutex::new(None),
            }),
        }
    }

    /// Load a persisted document and open a session on it.
    pub async fn open_existing(
        store: S,
        id: DocumentId,
        policy: AutosavePolicy,
    ) -> Result<Self, SessionError> {
        let document = store.fetch_document(id).await?;
        Ok(Self::open_with(store, document, policy))
    }

    /// Allocate an empty document remotely, then open a session on it.
    pub async fn open_new(store: S, policy: AutosavePolicy) -> Result<Self, SessionError> {
        let document = store.create_document(&DraftFields::default()).await?;
        Ok(Self::open_with(store, document, policy))
    }

    /// Keep `hook` armed while changes are unsaved or a save is running.
    pub fn install_unload_hook(&self, hook: Arc<dyn UnloadHook>) {
        let guard = UnloadGuard::spawn(self.inner.status.subscribe(), hook);
        let previous = self.inner.unload.lock().expect("unload lock poisoned").replace(guard);
        if let Some(previous) = previous {
            previous.release();
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.inner.document_id
    }

    pub fn policy(&self) -> AutosavePolicy {
        self.inner.policy
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// Current draft fields, including unsaved edits.
    pub fn fields(&self) -> DraftFields {
        self.inner.draft.snapshot()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.draft.has_unsaved_changes()
    }

    pub fn is_saving(&self) -> bool {
        self.inner.executor.is_in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &S {
        self.inner.executor.store()
    }

    /// Apply one edit and restart the quiet period. Edits that change
    /// nothing do not re-arm the timer. Must be called inside a tokio runtime.
    pub fn edit(&self, edit: FieldEdit) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let field = edit.field();
        let (changed, has_unsaved_changes) = self.inner.draft.apply(edit);
        if !changed {
            return Ok(false);
        }
        debug!(
            document_id = %self.inner.document_id,
            field = field.as_str(),
            has_unsaved_changes,
            "draft edited"
        );
        self.inner.status.edited(has_unsaved_changes);
        self.schedule_save();
        Ok(true)
    }

    /// Replace one field from its textual value.
    pub fn set_field(&self, name: FieldName, value: &str) -> Result<bool, SessionError> {
        let edit = FieldEdit::from_name_value(name, value)?;
        self.edit(edit)
    }

    /// Save now, skipping the remaining quiet period.
    pub async fn save_now(&self) -> Result<SaveOutcome, SessionError> {
        self.ensure_open()?;
        Ok(self.save_immediately(SaveTrigger::Manual).await)
    }

    /// Manual retry after a persistent failure.
    pub async fn retry_now(&self) -> Result<SaveOutcome, SessionError> {
        self.ensure_open()?;
        info!(document_id = %self.inner.document_id, "manual save retry");
        Ok(self.save_immediately(SaveTrigger::Manual).await)
    }

    /// End the editing session.
    ///
    /// 1. Cancel the debounce timer and any retry backoff.
    /// 2. Wait (bounded) for an in-flight save.
    /// 3. Flush unsaved changes, again if edits land while a flush is on the wire.
    /// 4. If the flush failed, ask `confirmer` before discarding.
    pub async fn close<C: CloseConfirmer>(
        &self,
        confirmer: &C,
    ) -> Result<CloseOutcome, SessionError> {
        let _close = self.inner.close_lock.lock().await;
        self.ensure_open()?;
        let document_id = self.inner.document_id;
        debug!(%document_id, "closing editing session");

        self.inner.closing.store(true, Ordering::SeqCst);
        self.cancel_timer();
        self.inner.executor.cancel_backoff();

        let mut wait_timed_out = false;
        if self.inner.executor.is_in_flight()
            && !self.inner.executor.wait_until_idle(self.inner.policy.close_wait).await
        {
            warn!(
                %document_id,
                close_wait_ms = self.inner.policy.close_wait.as_millis() as u64,
                "save still in flight after close wait, closing anyway"
            );
            wait_timed_out = true;
        }

        let mut final_save = None;
        let mut discarded_unsaved = false;
        while self.inner.draft.has_unsaved_changes() {
            let outcome = self.save_immediately(SaveTrigger::Close).await;
            if outcome.is_saved() {
                final_save = Some(outcome);
                continue;
            }

            let reason = match &outcome {
                SaveOutcome::Failed { error } => error.clone(),
                SaveOutcome::Deferred => "a previous save is still in flight".to_string(),
                SaveOutcome::Abandoned => "the final save was abandoned".to_string(),
                SaveOutcome::Saved { .. } => String::new(),
            };
            if !confirmer.confirm_discard(&reason).await {
                self.inner.closing.store(false, Ordering::SeqCst);
                self.inner.executor.resume_backoff();
                info!(%document_id, %reason, "close aborted, unsaved changes kept");
                return Ok(CloseOutcome::Aborted { reason });
            }
            // A deferred flush must not replay the discarded draft later.
            self.inner.executor.clear_pending();
            warn!(%document_id, %reason, "discarding unsaved changes on close");
            discarded_unsaved = true;
            final_save = Some(outcome);
            break;
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        self.cancel_timer();
        let guard = self.inner.unload.lock().expect("unload lock poisoned").take();
        if let Some(guard) = guard {
            guard.release();
        }
        info!(%document_id, wait_timed_out, discarded_unsaved, "editing session closed");

        Ok(CloseOutcome::Closed(CloseReport { wait_timed_out, final_save, discarded_unsaved }))
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.inner.document_id));
        }
        Ok(())
    }

    fn schedule_save(&self) {
        if self.inner.closing.load(Ordering::SeqCst) {
            debug!(document_id = %self.inner.document_id, "close flush pending, not re-arming");
            return;
        }
        let session = self.clone();
        let mut timer = self.inner.timer.lock().expect("timer lock poisoned");
        timer.arm(self.inner.policy.debounce, async move {
            if session.is_closed() {
                return;
            }
            session.attempt_save(SaveTrigger::Debounce).await;
        });
    }

    fn cancel_timer(&self) -> bool {
        self.inner.timer.lock().expect("timer lock poisoned").cancel()
    }

    async fn save_immediately(&self, trigger: SaveTrigger) -> SaveOutcome {
        if self.cancel_timer() {
            debug!(document_id = %self.inner.document_id, "pending debounce cancelled");
        }
        self.attempt_save(trigger).await
    }

    async fn attempt_save(&self, trigger: SaveTrigger) -> SaveOutcome {
        self.inner.executor.attempt_save(&self.inner.draft, &self.inner.status, trigger).await
    }
}
