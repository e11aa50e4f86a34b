// Consistent exit codes for the draftkeep CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   13 = network error (document store unreachable or failing)
//   14 = close aborted, unsaved changes were not persisted

use std::process;

use draftkeep_autosave::{SessionError, StoreError};
use draftkeep_common::edit::FieldParseError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Network = 13,
    CloseAborted = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(store_err) = cause.downcast_ref::<StoreError>() {
                return Self::from_store_error(store_err);
            }
            if let Some(session_err) = cause.downcast_ref::<SessionError>() {
                return match session_err {
                    SessionError::Open(store_err) => Self::from_store_error(store_err),
                    SessionError::Field(_) => Self::Usage,
                    SessionError::Closed(_) => Self::Error,
                };
            }
            if cause.downcast_ref::<FieldParseError>().is_some() {
                return Self::Usage;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::TimedOut => {
                        Self::Network
                    }
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }

    /// Transport failures and server-side statuses are network trouble;
    /// a missing or rejected document is an ordinary error.
    pub fn from_store_error(err: &StoreError) -> Self {
        match err {
            StoreError::Transport(_) | StoreError::Status { .. } => Self::Network,
            StoreError::NotFound(_) | StoreError::Rejected(_) | StoreError::Decode(_) => {
                Self::Error
            }
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
