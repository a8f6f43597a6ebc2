//! Carrying the ambient stack across tasks, threads and suspension points.
//!
//! The ambient stack lives in thread-local storage. A logical flow that
//! suspends and resumes on another thread, or that forks a child, needs its
//! view carried explicitly. The rules are:
//!
//! - A child inherits the parent's stack *reference* at fork time.
//! - Pushes made inside the child are visible to the child and its own
//!   descendants only.
//! - Nothing done in a child leaks back into the parent or into siblings that
//!   forked from the same point.
//!
//! [`WithContext`] implements this for futures: every poll installs the
//! flow's own stack into the thread-local slot and stores it back afterwards,
//! so the flow keeps its view regardless of which worker thread polls it.
//!
//! ```rust
//! use apm2_logctx::{ContextFutureExt, LogContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let _request = LogContext::push_property("RequestId", "r-1", false).unwrap();
//!
//! let child = async {
//!     let _step = LogContext::push_property("Step", 1, false).unwrap();
//!     tokio::task::yield_now().await;
//!     LogContext::depth()
//! };
//!
//! assert_eq!(child.in_current_context().await, 2);
//! assert_eq!(LogContext::depth(), 1);
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::{pin_project, pinned_drop};

use crate::slot::{AmbientSlot, StackSlot};
use crate::stack::EnricherStack;

/// A future that runs with its own ambient stack installed.
#[pin_project(PinnedDrop)]
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct WithContext<F> {
    #[pin]
    inner: Option<F>,
    stack: EnricherStack,
}

impl<F> WithContext<F> {
    /// Wraps `inner` so that it runs with `stack` as its ambient stack.
    pub const fn new(inner: F, stack: EnricherStack) -> Self {
        Self {
            inner: Some(inner),
            stack,
        }
    }

    /// Returns the flow's stack as of the last time it was suspended.
    #[must_use]
    pub const fn stack(&self) -> &EnricherStack {
        &self.stack
    }
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _installed = Installed::new(this.stack);
        match this.inner.as_pin_mut() {
            Some(inner) => inner.poll(cx),
            None => unreachable!("`WithContext` polled after its inner future was dropped"),
        }
    }
}

#[pinned_drop]
impl<F> PinnedDrop for WithContext<F> {
    fn drop(self: Pin<&mut Self>) {
        // Drop the inner future with the flow's stack installed so that guards
        // released during cancellation restore into this flow, not into
        // whatever happens to be current on the dropping thread.
        let this = self.project();
        let _installed = Installed::new(this.stack);
        let mut inner = this.inner;
        inner.set(None);
    }
}

/// Installs a flow's stack on the current thread until dropped, then writes
/// the flow's (possibly updated) stack back and reinstates the outer one.
struct Installed<'a> {
    flow: &'a mut EnricherStack,
    outer: Option<EnricherStack>,
}

impl<'a> Installed<'a> {
    fn new(flow: &'a mut EnricherStack) -> Self {
        let outer = AmbientSlot.replace(std::mem::take(flow));
        Self {
            flow,
            outer: Some(outer),
        }
    }
}

impl Drop for Installed<'_> {
    fn drop(&mut self) {
        if let Some(outer) = self.outer.take() {
            *self.flow = AmbientSlot.replace(outer);
        }
    }
}

/// Extension methods for running futures in a log context.
pub trait ContextFutureExt: Future + Sized {
    /// Runs the future with a copy of the caller's current ambient stack.
    fn in_current_context(self) -> WithContext<Self> {
        self.with_stack(AmbientSlot.load())
    }

    /// Runs the future with `stack` as its ambient stack.
    fn with_stack(self, stack: EnricherStack) -> WithContext<Self> {
        WithContext::new(self, stack)
    }

    /// Runs the future with an empty ambient stack.
    fn without_context(self) -> WithContext<Self> {
        self.with_stack(EnricherStack::empty())
    }
}

impl<F: Future> ContextFutureExt for F {}

/// Runs `f` with `stack` installed as the ambient stack of the current
/// thread, restoring the previous stack afterwards, including on unwind.
pub fn scope<R>(stack: EnricherStack, f: impl FnOnce() -> R) -> R {
    let mut flow = stack;
    let _installed = Installed::new(&mut flow);
    f()
}

/// Spawns a Tokio task that inherits the caller's ambient stack.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.in_current_context())
}

/// Runs blocking work on Tokio's blocking pool with the caller's ambient
/// stack installed.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn_blocking<F, R>(f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let stack = AmbientSlot.load();
    tokio::task::spawn_blocking(move || scope(stack, f))
}

/// Spawns an OS thread that inherits the caller's ambient stack.
pub fn spawn_thread<F, T>(f: F) -> std::thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let stack = AmbientSlot.load();
    std::thread::spawn(move || scope(stack, f))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::task::Waker;

    use super::*;
    use crate::context::AmbientContext;

    static AMBIENT: AmbientContext = AmbientContext::ambient();

    fn ambient() -> &'static AmbientContext {
        &AMBIENT
    }

    #[test]
    fn test_scope_installs_and_restores() {
        let outer = ambient();
        let _a = outer.push_property("A", 1, false).unwrap();
        let before = outer.snapshot();

        let inside = scope(EnricherStack::empty(), || {
            let _b = ambient().push_property("B", 2, false).unwrap();
            ambient().depth()
        });

        assert_eq!(inside, 1);
        assert!(outer.snapshot().ptr_eq(&before));
    }

    #[test]
    fn test_scope_restores_on_unwind() {
        let _a = ambient().push_property("A", 1, false).unwrap();
        let before = ambient().snapshot();

        let result = std::panic::catch_unwind(|| {
            scope(EnricherStack::empty(), || {
                ambient().push_property("B", 2, false).unwrap().detach();
                panic!("boom");
            })
        });

        assert!(result.is_err());
        assert!(ambient().snapshot().ptr_eq(&before));
    }

    #[test]
    fn test_spawn_thread_inherits_snapshot() {
        let _a = ambient().push_property("A", 1, false).unwrap();

        let depth = spawn_thread(|| {
            let _b = ambient().push_property("B", 2, false).unwrap();
            ambient().depth()
        })
        .join()
        .unwrap();

        assert_eq!(depth, 2);
        assert_eq!(ambient().depth(), 1);
    }

    #[test]
    fn test_flow_changes_do_not_leak_into_poller() {
        let _a = ambient().push_property("A", 1, false).unwrap();
        let before = ambient().snapshot();

        let mut future = Box::pin(
            async {
                ambient().push_property("Inner", 1, false).unwrap().detach();
                std::future::pending::<()>().await;
            }
            .without_context(),
        );

        let mut cx = Context::from_waker(Waker::noop());
        assert!(future.as_mut().poll(&mut cx).is_pending());

        assert!(ambient().snapshot().ptr_eq(&before));
        assert_eq!(future.stack().len(), 1);
    }

    #[test]
    fn test_cancelled_flow_restores_into_itself() {
        let _a = ambient().push_property("A", 1, false).unwrap();
        let before = ambient().snapshot();
        let observed = Arc::new(parking_lot::Mutex::new(None));

        let future = {
            let observed = Arc::clone(&observed);
            async move {
                let _scoped = ambient().push_property("Scoped", 1, false).unwrap();
                *observed.lock() = Some(ambient().depth());
                std::future::pending::<()>().await;
            }
            .without_context()
        };
        let mut future = Box::pin(future);

        let mut cx = Context::from_waker(Waker::noop());
        assert!(future.as_mut().poll(&mut cx).is_pending());
        drop(future);

        assert_eq!(*observed.lock(), Some(1));
        assert!(ambient().snapshot().ptr_eq(&before));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_spawned_task_keeps_view_across_yields() {
        let _a = ambient().push_property("A", 1, false).unwrap();

        let handle = spawn(async {
            let _b = ambient().push_property("B", 2, false).unwrap();
            let mut depths = Vec::new();
            for _ in 0..16 {
                tokio::task::yield_now().await;
                depths.push(ambient().depth());
            }
            depths
        });

        let depths = handle.await.unwrap();
        assert!(depths.iter().all(|&d| d == 2), "{depths:?}");
        assert_eq!(ambient().depth(), 1);
    }

    #[tokio::test]
    async fn test_spawn_blocking_inherits_snapshot() {
        let _a = ambient().push_property("A", 1, false).unwrap();

        let depth = spawn_blocking(|| ambient().depth()).await.unwrap();

        assert_eq!(depth, 1);
    }
}
