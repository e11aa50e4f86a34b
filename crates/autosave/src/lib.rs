// draftkeep-autosave: debounced, single-flight autosave for document editing sessions.

pub mod config;
pub mod draft;
pub mod executor;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod store;
pub mod unload;

pub use config::{AutosavePolicy, Config};
pub use executor::{SaveOutcome, SaveTrigger};
pub use session::{
    CloseConfirmer, CloseOutcome, CloseReport, EditingSession, FixedAnswer, SessionError,
};
pub use store::{DocumentStore, HttpStore, MemoryStore, StoreError};
pub use unload::{FlagUnloadHook, UnloadHook};
