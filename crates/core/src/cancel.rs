//! Cooperative cancellation for blocking waits
//!
//! Every blocking store operation (`lock`, `get_expiring_transactions`,
//! `wait_for`) takes a `CancellationToken`. A waiter registers a wake
//! callback with `on_cancel` so it can be woken out of its condvar wait the
//! moment `cancel()` runs; the returned `CancelRegistration` unregisters the
//! callback when dropped, so no registration outlives its wait.

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

type Callback = Arc<dyn Fn() + Send + Sync>;

struct TokenInner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<FxHashMap<u64, Callback>>,
}

/// Cloneable cancellation signal
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Signal cancellation and run every registered callback
    ///
    /// Idempotent: callbacks run only on the first call.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // Run outside the registry lock; callbacks may drop registrations.
        let callbacks: Vec<Callback> = self.inner.callbacks.lock().drain().map(|(_, cb)| cb).collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Whether `cancel()` has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Register `callback` to run on cancellation
    ///
    /// Runs `callback` immediately if the token is already cancelled.
    pub fn on_cancel(&self, callback: impl Fn() + Send + Sync + 'static) -> CancelRegistration {
        let callback: Callback = Arc::new(callback);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = self.inner.callbacks.lock();
            if !self.is_cancelled() {
                callbacks.insert(id, callback);
                return CancelRegistration {
                    token: Arc::downgrade(&self.inner),
                    id,
                };
            }
        }
        callback();
        CancelRegistration {
            token: Weak::new(),
            id,
        }
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `true` when the sleep was cut short by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let signal = Arc::new((Mutex::new(()), Condvar::new()));
        let wake = Arc::clone(&signal);
        let _registration = self.on_cancel(move || {
            let _guard = wake.0.lock();
            wake.1.notify_all();
        });

        // A deadline past the end of `Instant` sleeps until cancelled.
        let deadline = Instant::now().checked_add(duration);
        let mut guard = signal.0.lock();
        while !self.is_cancelled() {
            match deadline {
                None => signal.1.wait(&mut guard),
                Some(deadline) => {
                    if signal.1.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        self.is_cancelled()
    }

    /// Number of live registrations (for tests and diagnostics)
    pub fn registrations(&self) -> usize {
        self.inner.callbacks.lock().len()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle returned by [`CancellationToken::on_cancel`]
///
/// Dropping it unregisters the callback.
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancelRegistration {
    token: Weak<TokenInner>,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(inner) = self.token.upgrade() {
            inner.callbacks.lock().remove(&self.id);
        }
    }
}
