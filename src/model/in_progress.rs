use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Per-target "a run is in flight" flag.
///
/// A run claims the flag with [`InProgress::try_begin`] and releases it by
/// dropping the returned [`RunGuard`]. The scheduler's reload barrier parks on
/// [`InProgress::wait_idle`] until the flag clears.
#[derive(Debug, Default)]
pub struct InProgress {
    flag: AtomicBool,
    idle: Notify,
}

impl InProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Claims the flag. Returns `None` when a run is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Option<RunGuard> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                state: Arc::clone(self),
            })
    }

    /// Resolves once no run holds the flag.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if !self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the owning target's [`InProgress`] flag on drop.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<InProgress>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.flag.store(false, Ordering::Release);
        self.state.idle.notify_waiters();
    }
}
