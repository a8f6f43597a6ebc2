//! Process-wide entry points.
//!
//! Two facades expose the same operations over the two storage disciplines:
//!
//! - [`LogContext`]: the ambient, flow-local stack. What one task or thread
//!   pushes is invisible to unrelated flows.
//! - [`GlobalLogContext`]: one stack shared by the whole process, plus the
//!   [`ScopeLock`] that callers take when a sequence of updates must not
//!   interleave with other flows.
//!
//! ```rust
//! use apm2_logctx::GlobalLogContext;
//!
//! let _lock = GlobalLogContext::lock();
//! GlobalLogContext::push_property("AppVersion", "1.2.3", false)?.detach();
//!
//! assert!(GlobalLogContext::depth() >= 1);
//! GlobalLogContext::reset();
//! # Ok::<(), apm2_logctx::ContextError>(())
//! ```

use std::sync::LazyLock;

use serde::Serialize;

use crate::context::{AmbientContext, Bookmark, ContextStack, SharedContext};
use crate::enricher::SharedEnricher;
use crate::error::ContextResult;
use crate::lock::{LockToken, ScopeLock};
use crate::record::LogRecord;
use crate::slot::{AmbientSlot, SharedSlot};
use crate::stack::EnricherStack;
use crate::value::PropertyFactory;

static AMBIENT: AmbientContext = ContextStack::ambient();

static GLOBAL: SharedContext = ContextStack::shared();

static GLOBAL_LOCK: LazyLock<ScopeLock> = LazyLock::new(ScopeLock::new);

/// The ambient, flow-local log context.
///
/// # Caveats
///
/// The stack lives in thread-local storage. A future spawned with plain
/// `tokio::spawn` shares that storage with every other task polled on the
/// same worker thread: a [`Bookmark`] held across an `.await` there can be
/// seen by, and restore into, unrelated tasks. Spawn with
/// [`flow::spawn`](crate::flow::spawn) or wrap the future with
/// [`in_current_context`](crate::ContextFutureExt::in_current_context) so the
/// task carries its own stack between polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogContext;

impl LogContext {
    /// Returns the underlying stack.
    #[must_use]
    pub fn stack() -> &'static AmbientContext {
        &AMBIENT
    }

    /// Pushes a named property onto the current flow's stack.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidArgument`](crate::ContextError) for an
    /// empty name or a value that cannot be captured.
    pub fn push_property(
        name: impl Into<String>,
        value: impl Serialize,
        destructure: bool,
    ) -> ContextResult<Bookmark<'static, AmbientSlot>> {
        AMBIENT.push_property(name, value, destructure)
    }

    /// Pushes an enricher onto the current flow's stack.
    pub fn push(enricher: SharedEnricher) -> Bookmark<'static, AmbientSlot> {
        AMBIENT.push(enricher)
    }

    /// Pushes a batch of enrichers; the last one ends up on top.
    pub fn push_many<I>(enrichers: I) -> Bookmark<'static, AmbientSlot>
    where
        I: IntoIterator<Item = SharedEnricher>,
    {
        AMBIENT.push_many(enrichers)
    }

    /// Hides the current flow's enrichers until the bookmark is released.
    pub fn suspend() -> Bookmark<'static, AmbientSlot> {
        AMBIENT.suspend()
    }

    /// Clears the current flow's stack.
    pub fn reset() {
        AMBIENT.reset();
    }

    /// Returns a frozen view of the current flow's stack.
    #[must_use]
    pub fn snapshot() -> EnricherStack {
        AMBIENT.snapshot()
    }

    /// Returns the number of enrichers visible to the current flow.
    #[must_use]
    pub fn depth() -> usize {
        AMBIENT.depth()
    }

    /// Applies the current flow's enrichers to `record`.
    pub fn enrich(record: &mut LogRecord, factory: &dyn PropertyFactory) {
        AMBIENT.enrich(record, factory);
    }
}

/// The process-wide log context.
///
/// Every thread and task sees the same stack. Concurrent pushes from
/// different flows can lose updates; wrap multi-step updates in
/// [`lock`](Self::lock) or [`lock_async`](Self::lock_async).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalLogContext;

impl GlobalLogContext {
    /// Returns the underlying stack.
    #[must_use]
    pub fn stack() -> &'static SharedContext {
        &GLOBAL
    }

    /// Returns the lock guarding multi-step updates.
    #[must_use]
    pub fn scope_lock() -> &'static ScopeLock {
        &GLOBAL_LOCK
    }

    /// Blocks until the exclusive lock on the global context is acquired.
    pub fn lock() -> LockToken {
        GLOBAL_LOCK.lock()
    }

    /// Waits for the exclusive lock without blocking the thread.
    pub async fn lock_async() -> LockToken {
        GLOBAL_LOCK.lock_async().await
    }

    /// Pushes a named property onto the global stack.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidArgument`](crate::ContextError) for an
    /// empty name or a value that cannot be captured.
    pub fn push_property(
        name: impl Into<String>,
        value: impl Serialize,
        destructure: bool,
    ) -> ContextResult<Bookmark<'static, SharedSlot>> {
        GLOBAL.push_property(name, value, destructure)
    }

    /// Pushes an enricher onto the global stack.
    pub fn push(enricher: SharedEnricher) -> Bookmark<'static, SharedSlot> {
        GLOBAL.push(enricher)
    }

    /// Pushes a batch of enrichers; the last one ends up on top.
    pub fn push_many<I>(enrichers: I) -> Bookmark<'static, SharedSlot>
    where
        I: IntoIterator<Item = SharedEnricher>,
    {
        GLOBAL.push_many(enrichers)
    }

    /// Hides every global enricher until the bookmark is released.
    pub fn suspend() -> Bookmark<'static, SharedSlot> {
        GLOBAL.suspend()
    }

    /// Clears the global stack.
    pub fn reset() {
        GLOBAL.reset();
    }

    /// Returns a frozen view of the global stack.
    #[must_use]
    pub fn snapshot() -> EnricherStack {
        GLOBAL.snapshot()
    }

    /// Returns the number of global enrichers.
    #[must_use]
    pub fn depth() -> usize {
        GLOBAL.depth()
    }

    /// Applies the global enrichers to `record`.
    pub fn enrich(record: &mut LogRecord, factory: &dyn PropertyFactory) {
        GLOBAL.enrich(record, factory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facades_use_separate_disciplines() {
        let _lock = GlobalLogContext::lock();
        GlobalLogContext::reset();

        let _ambient = LogContext::push_property("Ambient", 1, false).unwrap();
        let _global = GlobalLogContext::push_property("Global", 1, false).unwrap();

        let seen = std::thread::spawn(|| (LogContext::depth(), GlobalLogContext::depth()))
            .join()
            .unwrap();

        assert_eq!(seen, (0, 1));
        assert_eq!(LogContext::depth(), 1);
    }

    #[test]
    fn test_scope_lock_is_shared() {
        let token = GlobalLogContext::lock();
        assert!(GlobalLogContext::scope_lock().is_locked());
        assert!(GlobalLogContext::scope_lock().try_lock().is_none());
        drop(token);
    }
}
