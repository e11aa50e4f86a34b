// Remote document persistence, abstracted for testability.
//
// `update_document` is an idempotent overwrite: sending the same fields twice
// leaves the persisted document identical.

pub mod http;
pub mod memory;

use std::future::Future;

use draftkeep_common::types::{Document, DocumentId, DraftFields};
use thiserror::Error;

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Abstraction over the remote document service.
pub trait DocumentStore: Send + Sync + 'static {
    /// Load a persisted document.
    fn fetch_document(
        &self,
        id: DocumentId,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// Allocate a new document holding `fields`.
    fn create_document(
        &self,
        fields: &DraftFields,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// Overwrite the editable fields of an existing document.
    fn update_document(
        &self,
        id: DocumentId,
        fields: &DraftFields,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;
}

/// Errors from a document store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, DNS failure, timeout and the like.
    #[error("document store unreachable: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("document store returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// The service refused the payload (validation and similar).
    #[error("document store rejected the update: {0}")]
    Rejected(String),

    #[error("could not decode document store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether a retry could plausibly succeed.
    ///
    /// The save executor does not consult this before retrying; it is
    /// reported alongside failures so permanent errors show up in logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500 || *code == 408 || *code == 429,
            Self::NotFound(_) | Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}
