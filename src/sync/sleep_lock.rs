use std::{
    cell::UnsafeCell,
    fmt::Debug,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};

use crate::{CancelToken, ErrorKind, Result};

use super::CANCEL_POLL_INTERVAL;


/// A mutual exclusion lock whose waiters are suspended instead of spinning.
///
/// Intended for locks that are held across I/O. The lock remembers which thread
/// holds it so ownership can be checked with [holding()](SleepLock::holding).
pub struct SleepLock<T: ?Sized> {
    state: Mutex<State>,
    wakeup: Condvar,
    data: UnsafeCell<T>,
}

#[derive(Debug, Default)]
struct State {
    locked: bool,
    holder: Option<ThreadId>,
}

unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            state: Default::default(),
            wakeup: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// Acquire the lock, suspending the current thread until it is available.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut state = self.state.lock();
        while state.locked {
            self.wakeup.wait(&mut state);
        }
        self.grant(&mut state)
    }

    /// Acquire the lock unless `cancel` fires first.
    ///
    /// The token is only consulted while the lock is busy, and a waiter that gives
    /// up never owned the lock.
    pub fn lock_interruptible(&self, cancel: &CancelToken) -> Result<SleepLockGuard<'_, T>> {
        let mut state = self.state.lock();
        while state.locked {
            if cancel.is_cancelled() {
                return Err(ErrorKind::Interrupted.into());
            }
            self.wakeup.wait_for(&mut state, CANCEL_POLL_INTERVAL);
        }
        Ok(self.grant(&mut state))
    }

    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.locked {
            None
        } else {
            Some(self.grant(&mut state))
        }
    }

    /// Whether the current thread holds this lock.
    pub fn holding(&self) -> bool {
        let state = self.state.lock();
        state.locked && state.holder == Some(thread::current().id())
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    fn grant(&self, state: &mut State) -> SleepLockGuard<'_, T> {
        state.locked = true;
        state.holder = Some(thread::current().id());
        SleepLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.locked);
        state.locked = false;
        state.holder = None;
        drop(state);
        self.wakeup.notify_all();
    }
}

impl<T: ?Sized> Debug for SleepLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepLock")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Proof of holding a [SleepLock]. Unlocks on drop.
///
/// Guards stay on the thread that acquired them, which is what makes the holder
/// check meaningful.
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> SleepLockGuard<'a, T> {
    pub fn lock(&self) -> &'a SleepLock<T> {
        self.lock
    }
}

impl<'a, T: ?Sized> Deref for SleepLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
