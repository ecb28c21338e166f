//! Keeps the device awake across hardware calls that must not be suspended.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const WAKE_LOCK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::wakelock");

/// A suspend blocker held across init, deinit, and routing commits.
pub trait WakeLock: Send + Sync {
    /// Blocks suspend until [`WakeLock::release`] is called.
    fn acquire(&self);

    /// Allows suspend again. Releasing an unheld lock is a no-op.
    fn release(&self);

    /// Whether the lock is currently held.
    fn is_held(&self) -> bool;
}

/// In-process wake lock that tracks whether it is held.
#[derive(Debug, Default)]
pub struct TrackedWakeLock {
    held: AtomicBool,
}

impl TrackedWakeLock {
    /// Builds an unheld lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl WakeLock for TrackedWakeLock {
    fn acquire(&self) {
        if !self.held.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: WAKE_LOCK_TARGET, "wake lock acquired");
        }
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            tracing::debug!(target: WAKE_LOCK_TARGET, "wake lock released");
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Holds a [`WakeLock`] until dropped.
#[must_use = "the wake lock is released as soon as the guard is dropped"]
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
}

impl WakeLockGuard {
    /// Acquires `lock` for the lifetime of the guard.
    pub fn acquire(lock: Arc<dyn WakeLock>) -> Self {
        lock.acquire();
        Self { lock }
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}
