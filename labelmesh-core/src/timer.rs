//! Timer service (spec.md §4.B): fire a callback once at an absolute
//! wall-clock deadline, cancellable. Firing is best-effort — callers must
//! re-check their own invariants when the callback runs, since the
//! scheduler may lag under load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::clock::Clock;

/// Handle to a scheduled callback. Dropping it does *not* cancel the
/// timer — call `cancel()` explicitly, mirroring the explicit
/// `handle.cancel()` contract in spec.md §4.B.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Prevent invocation if the callback has not yet fired.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Schedules callbacks to run at an absolute deadline, via `tokio::time`.
#[derive(Clone, Default)]
pub struct TimerService;

impl TimerService {
    pub fn new() -> Self {
        Self
    }

    /// Run `fut` to completion once at absolute time `eol` (seconds
    /// since epoch, as measured by `clock`). Returns a handle that
    /// cancels delivery. `fut` is typically a send into the owning
    /// actor's mailbox, so firing re-enters the single-task domain
    /// rather than touching shared state directly (spec.md §5).
    pub fn schedule<Fut>(&self, clock: Arc<dyn Clock>, eol: f64, fut: Fut) -> TimerHandle
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = tokio::spawn(async move {
            let remaining = eol - clock.now();
            if remaining > 0.0 {
                tokio::time::sleep(std::time::Duration::from_secs_f64(remaining)).await;
            }
            if !flag.load(Ordering::SeqCst) {
                fut.await;
            }
        });
        TimerHandle { cancelled, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use std::sync::atomic::AtomicU32;

    #[tokio::test(start_paused = true)]
    async fn fires_after_deadline() {
        let svc = TimerService::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let now = clock.now();
        let _h = svc.schedule(clock, now + 1.0, async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::advance(std::time::Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let svc = TimerService::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let now = clock.now();
        let h = svc.schedule(clock, now + 1.0, async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        h.cancel();
        tokio::time::advance(std::time::Duration::from_millis(1100)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
