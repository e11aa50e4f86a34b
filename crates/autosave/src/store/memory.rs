use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use draftkeep_common::types::{Document, DocumentId, DraftFields};

use super::{DocumentStore, StoreError};

/// In-process document store. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<HashMap<DocumentId, Document>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the write counter.
    pub fn insert(&self, document: Document) {
        self.docs.lock().expect("memory store lock poisoned").insert(document.id, document);
    }

    pub fn get(&self, id: DocumentId) -> Option<Document> {
        self.docs.lock().expect("memory store lock poisoned").get(&id).cloned()
    }

    /// Number of successful `update_document` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DocumentStore for MemoryStore {
    async fn fetch_document(&self, id: DocumentId) -> Result<Document, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    async fn create_document(&self, fields: &DraftFields) -> Result<Document, StoreError> {
        let document =
            Document { id: DocumentId::new(), fields: fields.clone(), updated_at: Utc::now() };
        self.insert(document.clone());
        Ok(document)
    }

    async fn update_document(
        &self,
        id: DocumentId,
        fields: &DraftFields,
    ) -> Result<Document, StoreError> {
        let mut docs = self.docs.lock().expect("memory store lock poisoned");
        let document = docs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        document.fields = fields.clone();
        document.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(document.clone())
    }
}
