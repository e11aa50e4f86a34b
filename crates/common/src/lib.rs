// draftkeep-common: document, draft and save-status types shared across crates

pub mod edit;
pub mod status;
pub mod types;
