//! Blocking primitives used by the cache.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

pub use self::sleep_lock::{SleepLock, SleepLockGuard};

mod sleep_lock;

/// How long an interruptible waiter sleeps before checking its token again.
pub(crate) const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A shared termination request.
///
/// Handing a clone to an interruptible operation lets another thread make that
/// operation give up while it is still waiting.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
