//! Per-id exclusive lock
//!
//! `lock` and `free` arrive as separate calls (possibly from different
//! stack frames), so a guard-based mutex does not fit. `KeyedLock` is a
//! binary semaphore: a `held` flag behind a mutex plus a condvar that is
//! signalled on release and on cancellation.

use ledger_core::CancellationToken;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a blocking acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock is now held by the caller
    Acquired,
    /// The timeout elapsed first
    TimedOut,
    /// The cancellation token fired first
    Cancelled,
}

#[derive(Debug, Default)]
struct LockState {
    held: Mutex<bool>,
    released: Condvar,
}

/// Exclusive lock with timed, cancellable and non-blocking acquisition
#[derive(Debug, Default)]
pub struct KeyedLock {
    state: Arc<LockState>,
}

impl KeyedLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free, never blocking
    pub fn try_acquire(&self) -> bool {
        let mut held = self.state.held.lock();
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    /// Take the lock, waiting up to `timeout` (`None` = forever)
    pub fn acquire(&self, timeout: Option<Duration>, cancel: &CancellationToken) -> LockOutcome {
        if self.try_acquire() {
            return LockOutcome::Acquired;
        }
        if timeout == Some(Duration::ZERO) {
            return LockOutcome::TimedOut;
        }

        // A timeout past the end of `Instant` waits without a deadline.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        // Registered before taking `held`: the callback locks it too.
        let state = Arc::clone(&self.state);
        let _registration = cancel.on_cancel(move || {
            let _held = state.held.lock();
            state.released.notify_all();
        });

        let mut held = self.state.held.lock();
        loop {
            if !*held {
                *held = true;
                return LockOutcome::Acquired;
            }
            if cancel.is_cancelled() {
                return LockOutcome::Cancelled;
            }
            match deadline {
                None => self.state.released.wait(&mut held),
                Some(deadline) => {
                    if self.state.released.wait_until(&mut held, deadline).timed_out() && *held {
                        return LockOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// Release the lock, returning whether it was held
    pub fn release(&self) -> bool {
        let mut held = self.state.held.lock();
        let was_held = std::mem::replace(&mut *held, false);
        if was_held {
            self.state.released.notify_one();
        }
        was_held
    }

    /// Whether the lock is currently held, without waiting
    pub fn is_held(&self) -> bool {
        *self.state.held.lock()
    }
}
