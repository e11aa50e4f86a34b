// Draft state holder: the current fields plus the last persisted baseline.
//
// Every read goes through the lock, so a save always sends whatever the draft
// holds at dispatch time rather than a copy taken when the debounce timer was
// armed.

use std::sync::Mutex;

use draftkeep_common::edit::FieldEdit;
use draftkeep_common::types::DraftFields;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Draft {
    fields: DraftFields,
    baseline: DraftFields,
}

#[derive(Debug)]
pub struct DraftHolder {
    inner: Mutex<Draft>,
}

impl DraftHolder {
    /// Start from a persisted snapshot: fields and baseline are equal.
    pub fn new(persisted: DraftFields) -> Self {
        Self { inner: Mutex::new(Draft { fields: persisted.clone(), baseline: persisted }) }
    }

    /// Apply one edit. Returns `(changed, has_unsaved_changes)`.
    pub fn apply(&self, edit: FieldEdit) -> (bool, bool) {
        let mut draft = self.inner.lock().expect("draft lock poisoned");
        let changed = edit.apply(&mut draft.fields);
        (changed, draft.fields != draft.baseline)
    }

    /// Copy of the current fields.
    pub fn snapshot(&self) -> DraftFields {
        self.inner.lock().expect("draft lock poisoned").fields.clone()
    }

    pub fn baseline(&self) -> DraftFields {
        self.inner.lock().expect("draft lock poisoned").baseline.clone()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        let draft = self.inner.lock().expect("draft lock poisoned");
        draft.fields != draft.baseline
    }

    /// Record that `sent` is now persisted. Edits made after `sent` was
    /// captured stay unsaved. Returns `has_unsaved_changes` afterwards.
    pub fn mark_persisted(&self, sent: DraftFields) -> bool {
        let mut draft = self.inner.lock().expect("draft lock poisoned");
        draft.baseline = sent;
        draft.fields != draft.baseline
    }
}
