use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use draftkeep_autosave::{
    AutosavePolicy, CloseConfirmer, CloseOutcome, CloseReport, DocumentStore, EditingSession,
    FixedAnswer, FlagUnloadHook, MemoryStore, SaveOutcome, SessionError, StoreError,
};
use draftkeep_common::edit::FieldEdit;
use draftkeep_common::status::SaveState;
use draftkeep_common::types::{Document, DocumentId, DraftFields};
use tokio::time::{self, Instant};

/// Store with a configurable latency and failure budget that records every
/// request and the peak number of concurrent requests.
#[derive(Clone)]
struct RecordingStore {
    latency: Duration,
    failures_left: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(Instant, DraftFields)>>>,
}

impl RecordingStore {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            failures_left: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(self, failures: usize) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    fn heal(&self) {
        self.failures_left.store(0, Ordering::SeqCst);
    }

    fn requests(&self) -> Vec<(Instant, DraftFields)> {
        self.requests.lock().unwrap().clone()
    }

    fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl DocumentStore for RecordingStore {
    async fn fetch_document(&self, id: DocumentId) -> Result<Document, StoreError> {
        Err(StoreError::NotFound(id))
    }

    async fn create_document(&self, fields: &DraftFields) -> Result<Document, StoreError> {
        Ok(Document { id: DocumentId::new(), fields: fields.clone(), updated_at: Utc::now() })
    }

    async fn update_document(
        &self,
        id: DocumentId,
        fields: &DraftFields,
    ) -> Result<Document, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push((Instant::now(), fields.clone()));

        if !self.latency.is_zero() {
            time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Status { code: 503, message: "service unavailable".into() });
        }
        Ok(Document { id, fields: fields.clone(), updated_at: Utc::now() })
    }
}

/// Confirmer that records the reasons it was asked about.
struct RecordingConfirmer {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl RecordingConfirmer {
    fn new(answer: bool) -> Self {
        Self { answer, asked: Mutex::new(Vec::new()) }
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl CloseConfirmer for RecordingConfirmer {
    async fn confirm_discard(&self, reason: &str) -> bool {
        self.asked.lock().unwrap().push(reason.to_string());
        self.answer
    }
}

fn open(store: &RecordingStore) -> EditingSession<RecordingStore> {
    let document = Document {
        id: DocumentId::new(),
        fields: DraftFields::default(),
        updated_at: Utc::now(),
    };
    EditingSession::open_with(store.clone(), document, AutosavePolicy::default())
}

fn title(value: &str) -> FieldEdit {
    FieldEdit::Title(value.to_string())
}

fn body(value: &str) -> FieldEdit {
    FieldEdit::Body(value.to_string())
}

#[tokio::test(start_paused = true)]
async fn edits_within_the_quiet_period_coalesce_into_one_request() {
    let store = RecordingStore::new(Duration::ZERO);
    let session = open(&store);
    let start = Instant::now();

    session.edit(title("Hello")).unwrap();
    time::sleep(Duration::from_millis(200)).await;
    session.edit(body("World")).unwrap();

    time::sleep(Duration::from_millis(790)).await;
    assert!(store.requests().is_empty(), "no request before the quiet period ends");

    time::sleep(Duration::from_millis(20)).await;
    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    let (at, sent) = &requests[0];
    let offset = *at - start;
    assert!(offset >= Duration::from_millis(1000) && offset < Duration::from_millis(1010));
    assert_eq!(sent.title, "Hello");
    assert_eq!(sent.body, "World");
    assert_eq!(session.status().state, SaveState::Saved);
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_request_in_flight() {
    let store = RecordingStore::new(Duration::from_millis(1500));
    let session = open(&store);

    // Debounce fires every 800ms of quiet; manual saves land mid-flight.
    for round in 0..6 {
        session.edit(body(&format!("round {round}"))).unwrap();
        time::sleep(Duration::from_millis(900)).await;
        let manual = session.clone();
        tokio::spawn(async move { manual.save_now().await });
        time::sleep(Duration::from_millis(100)).await;
    }
    time::sleep(Duration::from_secs(10)).await;

    assert_eq!(store.peak_in_flight(), 1);
    let requests = store.requests();
    assert!(requests.len() >= 2);
    assert_eq!(requests.last().unwrap().1.body, "round 5");
    assert!(!session.has_unsaved_changes());
}

#[tokio::test(start_paused = true)]
async fn edit_during_flight_yields_exactly_one_follow_up() {
    let store = RecordingStore::new(Duration::from_millis(1500));
    let session = open(&store);

    session.edit(title("first")).unwrap();
    // Debounce fires at 800ms; the request runs until 2300ms.
    time::sleep(Duration::from_millis(900)).await;
    assert!(session.is_saving());

    session.edit(title("second")).unwrap();
    // Second debounce fires at 1700ms while the first request is in flight.
    time::sleep(Duration::from_millis(900)).await;
    assert_eq!(store.requests().len(), 1);
    assert!(session.has_unsaved_changes());

    time::sleep(Duration::from_secs(5)).await;
    let requests = store.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].1.title, "first");
    assert_eq!(requests[1].1.title, "second");
    assert!(!session.has_unsaved_changes());
    assert_eq!(store.peak_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_save_retries_with_fixed_backoff_then_fails() {
    let store = RecordingStore::new(Duration::ZERO).failing(usize::MAX);
    let session = open(&store);

    session.edit(body("unsaved")).unwrap();
    time::sleep(Duration::from_secs(5)).await;

    let requests = store.requests();
    assert_eq!(requests.len(), 3, "one attempt plus two retries");
    for pair in requests.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= Duration::from_millis(1000) && gap < Duration::from_millis(1010), "{gap:?}");
    }

    let status = session.status();
    assert_eq!(status.state, SaveState::Failed);
    assert!(status.has_unsaved_changes);
    assert!(!status.is_saving);
    assert!(status.last_error.as_deref().is_some_and(|error| error.contains("503")));

    // No further automatic attempts.
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(store.requests().len(), 3);

    store.heal();
    let outcome = session.retry_now().await.unwrap();
    assert!(outcome.is_saved());
    let status = session.status();
    assert_eq!(status.state, SaveState::Saved);
    assert!(status.last_error.is_none());
    assert!(status.last_saved_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn close_flushes_unsaved_changes_immediately() {
    let store = RecordingStore::new(Duration::from_millis(300));
    let session = open(&store);
    session.edit(title("keep me")).unwrap();

    let start = Instant::now();
    let outcome = session.close(&FixedAnswer(false)).await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(800), "close must not wait for debounce");
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected a closed session, got {outcome:?}");
    };
    assert!(matches!(report.final_save, Some(SaveOutcome::Saved { .. })));
    assert!(!report.discarded_unsaved);
    assert_eq!(store.requests().len(), 1);
    assert_eq!(store.requests()[0].1.title, "keep me");

    // The cancelled debounce never fires.
    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_waits_for_in_flight_save_then_flushes_the_rest() {
    let store = RecordingStore::new(Duration::from_millis(1500));
    let session = open(&store);

    session.edit(title("first")).unwrap();
    time::sleep(Duration::from_millis(900)).await;
    session.edit(title("second")).unwrap();

    let outcome = session.close(&FixedAnswer(false)).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected a closed session, got {outcome:?}");
    };
    assert!(!report.wait_timed_out);
    assert!(matches!(report.final_save, Some(SaveOutcome::Saved { .. })));

    let requests = store.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].1.title, "second");
    assert_eq!(store.peak_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_wait_is_bounded_and_declined_discard_keeps_session_open() {
    let store = RecordingStore::new(Duration::from_secs(10));
    let session = open(&store);

    session.edit(title("slow")).unwrap();
    time::sleep(Duration::from_millis(900)).await;
    assert!(session.is_saving());

    let confirmer = RecordingConfirmer::new(false);
    let start = Instant::now();
    let outcome = session.close(&confirmer).await.unwrap();
    let waited = start.elapsed();

    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_millis(5100), "{waited:?}");
    assert!(matches!(outcome, CloseOutcome::Aborted { .. }));
    assert_eq!(confirmer.asked().len(), 1);
    assert!(!session.is_closed());

    // The slow save completes and the deferred flush replays afterwards.
    time::sleep(Duration::from_secs(30)).await;
    assert!(!session.has_unsaved_changes());

    let outcome = session.close(&FixedAnswer(false)).await.unwrap();
    assert_eq!(
        outcome,
        CloseOutcome::Closed(CloseReport {
            wait_timed_out: false,
            final_save: None,
            discarded_unsaved: false,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn discard_after_bounded_wait_does_not_replay_the_close_flush() {
    let store = RecordingStore::new(Duration::from_secs(10));
    let session = open(&store);

    session.edit(title("slow")).unwrap();
    time::sleep(Duration::from_millis(900)).await;
    assert!(session.is_saving());
    session.edit(body("never sent")).unwrap();

    let confirmer = RecordingConfirmer::new(true);
    let outcome = session.close(&confirmer).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected a closed session, got {outcome:?}");
    };
    assert!(report.wait_timed_out);
    assert!(report.discarded_unsaved);
    assert_eq!(report.final_save, Some(SaveOutcome::Deferred));
    assert_eq!(confirmer.asked().len(), 1);

    // The slow save lands; the discarded draft is not written after it.
    time::sleep(Duration::from_secs(30)).await;
    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.title, "slow");
    assert_eq!(requests[0].1.body, "");
}

#[tokio::test(start_paused = true)]
async fn edit_landing_during_the_close_flush_is_saved_before_close_returns() {
    let store = RecordingStore::new(Duration::from_millis(300));
    let session = open(&store);
    session.edit(title("a")).unwrap();

    let closing = {
        let session = session.clone();
        tokio::spawn(async move { session.close(&FixedAnswer(false)).await })
    };
    time::sleep(Duration::from_millis(100)).await;
    assert!(session.is_saving());
    session.edit(title("b")).unwrap();

    let outcome = closing.await.unwrap().unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected a closed session, got {outcome:?}");
    };
    assert!(!report.discarded_unsaved);
    assert!(matches!(report.final_save, Some(SaveOutcome::Saved { .. })));
    assert!(session.is_closed());
    assert!(!session.has_unsaved_changes());
    assert_eq!(session.status().state, SaveState::Saved);

    let at_close = store.requests().len();
    time::sleep(Duration::from_secs(3)).await;
    let requests = store.requests();
    assert_eq!(requests.len(), at_close, "nothing is written after close");
    let titles: Vec<&str> = requests.iter().map(|(_, fields)| fields.title.as_str()).collect();
    assert_eq!(titles, ["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn failed_close_save_requires_confirmation_to_discard() {
    let store = RecordingStore::new(Duration::ZERO).failing(usize::MAX);
    let session = open(&store);
    session.edit(body("precious")).unwrap();

    let declined = RecordingConfirmer::new(false);
    let outcome = session.close(&declined).await.unwrap();
    let CloseOutcome::Aborted { reason } = outcome else {
        panic!("expected close to be aborted, got {outcome:?}");
    };
    assert!(reason.contains("503"));
    assert_eq!(declined.asked(), vec![reason]);
    assert_eq!(store.requests().len(), 3, "close-path saves still retry");
    assert!(session.has_unsaved_changes());
    assert!(!session.is_closed());

    let accepted = RecordingConfirmer::new(true);
    let outcome = session.close(&accepted).await.unwrap();
    let CloseOutcome::Closed(report) = outcome else {
        panic!("expected a closed session, got {outcome:?}");
    };
    assert!(report.discarded_unsaved);
    assert!(matches!(report.final_save, Some(SaveOutcome::Failed { .. })));
    assert!(session.is_closed());
    assert!(matches!(session.edit(body("late")), Err(SessionError::Closed(_))));
}

#[tokio::test(start_paused = true)]
async fn close_cuts_short_a_background_retry_backoff() {
    let store = RecordingStore::new(Duration::ZERO).failing(1);
    let session = open(&store);

    session.edit(body("retry me")).unwrap();
    // First attempt fails at 800ms; the backoff would retry at 1800ms.
    time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.requests().len(), 1);

    let outcome = session.close(&FixedAnswer(false)).await.unwrap();
    assert!(matches!(outcome, CloseOutcome::Closed(_)));

    time::sleep(Duration::from_secs(5)).await;
    let requests = store.requests();
    assert_eq!(requests.len(), 2, "the close flush replaces the background retry");
    assert_eq!(requests[1].1.body, "retry me");
}

#[tokio::test(start_paused = true)]
async fn same_snapshot_saved_twice_leaves_document_unchanged() {
    let store = MemoryStore::new();
    let session =
        EditingSession::open_new(store.clone(), AutosavePolicy::default()).await.unwrap();
    session.edit(title("Plan")).unwrap();
    session.edit(FieldEdit::AddTag("work".into())).unwrap();

    assert!(session.save_now().await.unwrap().is_saved());
    let first = store.get(session.document_id()).unwrap().fields;
    assert!(session.save_now().await.unwrap().is_saved());
    let second = store.get(session.document_id()).unwrap().fields;

    assert_eq!(store.write_count(), 2);
    assert_eq!(first, second);
    assert_eq!(second, session.fields());
}

#[tokio::test(start_paused = true)]
async fn unsaved_flag_tracks_saves_and_edits() {
    let store = RecordingStore::new(Duration::from_millis(100));
    let session = open(&store);
    let mut status = session.subscribe();

    session.edit(title("one")).unwrap();
    assert!(session.status().has_unsaved_changes);
    assert_eq!(session.status().state, SaveState::Dirty);

    status.wait_for(|s| s.state == SaveState::Saved).await.unwrap();
    assert!(!session.status().has_unsaved_changes);

    session.edit(title("two")).unwrap();
    let current = session.status();
    assert!(current.has_unsaved_changes);
    assert_eq!(current.state, SaveState::Dirty);
}

#[tokio::test(start_paused = true)]
async fn unload_hook_is_armed_while_work_is_at_risk() {
    let store = RecordingStore::new(Duration::from_millis(500));
    let session = open(&store);
    let hook = FlagUnloadHook::new();
    session.install_unload_hook(Arc::new(hook.clone()));

    time::sleep(Duration::from_millis(1)).await;
    assert!(!hook.is_armed());

    session.edit(title("draft")).unwrap();
    time::sleep(Duration::from_millis(1)).await;
    assert!(hook.is_armed());

    // Saving (800ms..1300ms) keeps it armed; afterwards it drops.
    time::sleep(Duration::from_millis(1000)).await;
    assert!(session.is_saving());
    assert!(hook.is_armed());
    time::sleep(Duration::from_millis(500)).await;
    assert!(!hook.is_armed());

    session.edit(title("again")).unwrap();
    time::sleep(Duration::from_millis(1)).await;
    assert!(hook.is_armed());

    session.close(&FixedAnswer(true)).await.unwrap();
    assert!(!hook.is_armed());
}
