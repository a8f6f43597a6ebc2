//! Mutual exclusion for multi-step context updates.
//!
//! Individual pushes never need a lock. [`ScopeLock`] exists for callers that
//! want a *sequence* of operations (push, push, read, pop) to happen without
//! another flow's pushes interleaving.
//!
//! Both entry points share one binary [`Semaphore`], so mutual exclusion and
//! fairness are identical whichever one a caller uses. Tokio's semaphore
//! hands out permits in FIFO order.
//!
//! # Invariants
//!
//! - [INV-LK-001] At most one [`LockToken`] is held at a time per lock.
//! - [INV-LK-002] A token releases its permit exactly once, on
//!   [`LockToken::release`] or on drop, whichever comes first.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

use crate::DIAGNOSTICS_TARGET;

/// A binary semaphore with blocking and suspending acquisition.
#[derive(Debug, Clone)]
pub struct ScopeLock {
    semaphore: Arc<Semaphore>,
}

impl ScopeLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Blocks the calling thread until the lock is acquired.
    ///
    /// Intended for synchronous code. From async code use
    /// [`lock_async`](Self::lock_async), which suspends the task instead of
    /// blocking a runtime worker.
    #[must_use = "the lock is released as soon as the token is dropped"]
    pub fn lock(&self) -> LockToken {
        futures::executor::block_on(self.lock_async())
    }

    /// Waits for the lock without blocking the underlying thread.
    ///
    /// The returned token may be released on a different thread than the one
    /// that started waiting.
    #[must_use = "the lock is released as soon as the token is dropped"]
    pub async fn lock_async(&self) -> LockToken {
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => {
                trace!(target: DIAGNOSTICS_TARGET, "acquired log context lock");
                LockToken::new(permit)
            },
            Err(_) => unreachable!("log context semaphore is never closed"),
        }
    }

    /// Acquires the lock if it is free.
    #[must_use]
    pub fn try_lock(&self) -> Option<LockToken> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(LockToken::new(permit)),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => unreachable!("log context semaphore is never closed"),
        }
    }

    /// Returns `true` if a token is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for ScopeLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a [`ScopeLock`].
#[derive(Debug)]
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken {
    permit: Option<OwnedSemaphorePermit>,
}

impl LockToken {
    const fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            permit: Some(permit),
        }
    }

    /// Releases the lock now. Calling this again does nothing.
    pub fn release(&mut self) {
        if self.permit.take().is_some() {
            trace!(target: DIAGNOSTICS_TARGET, "released log context lock");
        }
    }

    /// Returns `true` until the token has been released.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.release();
    }
}
