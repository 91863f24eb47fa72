//! Run-loop completion tracking.
//!
//! The Commander needs to know when every mysis goroutine has exited
//! (StopAll). Instead of a back-pointer from mysis to Commander, each run
//! loop receives a `CompletionHandle` at spawn; calling `done()` (or
//! dropping it) signals the shared `WaitGroup`.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

/// Counts outstanding run loops; `wait` resolves when all handles are done.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a handle for one run loop.
    pub fn register(&self) -> CompletionHandle {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        CompletionHandle {
            inner: Arc::clone(&self.inner),
            completed: false,
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Wait until every registered handle has completed.
    pub async fn wait(&self) {
        let mut notified = pin!(self.inner.notify.notified());
        loop {
            if self.count() == 0 {
                return;
            }
            // Arm before re-checking so a completion between the check and
            // the await is not missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }
}

/// One run loop's completion token. Signals exactly once, on `done()` or on
/// drop.
pub struct CompletionHandle {
    inner: Arc<Inner>,
    completed: bool,
}

impl CompletionHandle {
    pub fn done(mut self) {
        self.complete();
    }

    fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.complete();
    }
}
