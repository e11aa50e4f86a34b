// Unload guard: asks the host to intercept abrupt termination while work is
// unsaved or a save is running. Best effort only; a killed process cannot be
// stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use draftkeep_common::status::SaveStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Host-side interception of termination attempts (window close, Ctrl-C).
pub trait UnloadHook: Send + Sync + 'static {
    fn set_armed(&self, armed: bool);
}

/// Shared flag the host can poll when a termination request arrives.
#[derive(Debug, Clone, Default)]
pub struct FlagUnloadHook {
    armed: Arc<AtomicBool>,
}

impl FlagUnloadHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl UnloadHook for FlagUnloadHook {
    fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }
}

/// Keeps a hook in sync with the session status until released.
pub struct UnloadGuard {
    task: JoinHandle<()>,
    hook: Arc<dyn UnloadHook>,
}

impl UnloadGuard {
    pub fn spawn(mut status: watch::Receiver<SaveStatus>, hook: Arc<dyn UnloadHook>) -> Self {
        let task_hook = Arc::clone(&hook);
        let task = tokio::spawn(async move {
            let mut armed = None;
            loop {
                let wanted = status.borrow_and_update().needs_unload_guard();
                if armed != Some(wanted) {
                    debug!(armed = wanted, "unload guard updated");
                    task_hook.set_armed(wanted);
                    armed = Some(wanted);
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
        });
        Self { task, hook }
    }

    /// Stop tracking and disarm the hook.
    pub fn release(self) {
        self.task.abort();
        self.hook.set_armed(false);
    }
}
