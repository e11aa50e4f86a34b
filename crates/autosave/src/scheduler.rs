// Save scheduler: a cancellable quiet-period timer.
//
// Each `arm` replaces the previous timer, so a burst of edits yields one
// firing `delay` after the last edit. The fired action runs on its own task:
// cancelling or re-arming the timer never cancels a save it already started.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Default)]
pub struct DebounceTimer {
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any outstanding timer and start a new one that runs `action`
    /// once `delay` elapses.
    pub fn arm<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!("debounce timer fired");
            tokio::spawn(action);
        }));
    }

    /// Cancel the outstanding timer. Returns true if one was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time;

    fn counting_action(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_quiet_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();

        timer.arm(Duration::from_millis(800), counting_action(&fired));
        assert!(timer.is_armed());

        time::sleep(Duration::from_millis(799)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_quiet_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();

        timer.arm(Duration::from_millis(800), counting_action(&fired));
        time::sleep(Duration::from_millis(600)).await;
        timer.arm(Duration::from_millis(800), counting_action(&fired));

        // 1000ms after the first arm, only 400ms after the second.
        time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_millis(401)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();

        timer.arm(Duration::from_millis(800), counting_action(&fired));
        assert!(timer.cancel());
        assert!(!timer.cancel());

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_after_fire_does_not_abort_the_action() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut timer = DebounceTimer::new();

        let flag = Arc::clone(&finished);
        timer.arm(Duration::from_millis(100), async move {
            time::sleep(Duration::from_millis(1000)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        // Timer fired at 100ms; its action is now mid-way.
        time::sleep(Duration::from_millis(500)).await;
        timer.cancel();
        timer.arm(Duration::from_millis(100), async {});

        time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
