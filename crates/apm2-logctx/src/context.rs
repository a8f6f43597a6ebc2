//! Context stack operations and scoped restoration.
//!
//! A [`ContextStack`] pairs a storage discipline with the push/suspend/reset
//! operations. Every scoped operation returns a [`Bookmark`] holding the stack
//! as it was *before* the operation; releasing the bookmark puts that exact
//! snapshot back.
//!
//! # Bookmark semantics
//!
//! A bookmark restores a snapshot, it does not pop a level. Released in LIFO
//! order, bookmarks behave like ordinary nested scopes. Released out of order,
//! each one still restores the snapshot it captured: an older bookmark
//! discards everything pushed after it, and a younger bookmark released
//! afterwards brings back the state it captured.
//!
//! ```rust
//! use apm2_logctx::{ContextStack, SharedSlot};
//!
//! let stack = ContextStack::with_slot(SharedSlot::new());
//!
//! let outer = stack.push_property("A", 1, false)?;
//! {
//!     let _inner = stack.push_property("A", 2, false)?;
//!     assert_eq!(stack.depth(), 2);
//! }
//! assert_eq!(stack.depth(), 1);
//! drop(outer);
//! assert_eq!(stack.depth(), 0);
//! # Ok::<(), apm2_logctx::ContextError>(())
//! ```

use serde::Serialize;
use tracing::{debug, trace};

use crate::DIAGNOSTICS_TARGET;
use crate::enricher::{PropertyEnricher, SharedEnricher};
use crate::error::ContextResult;
use crate::record::LogRecord;
use crate::slot::{AmbientSlot, SharedSlot, StackSlot};
use crate::stack::EnricherStack;
use crate::value::PropertyFactory;

/// A context stack over the storage discipline `S`.
#[derive(Debug, Default)]
pub struct ContextStack<S> {
    slot: S,
}

/// The flow-local context stack.
pub type AmbientContext = ContextStack<AmbientSlot>;

/// A context stack shared by every thread and task.
pub type SharedContext = ContextStack<SharedSlot>;

impl ContextStack<AmbientSlot> {
    /// Returns a handle to the flow-local stack.
    #[must_use]
    pub const fn ambient() -> Self {
        Self { slot: AmbientSlot }
    }
}

impl ContextStack<SharedSlot> {
    /// Creates a new, empty shared stack.
    #[must_use]
    pub const fn shared() -> Self {
        Self {
            slot: SharedSlot::new(),
        }
    }
}

impl<S: StackSlot> ContextStack<S> {
    /// Creates a context stack over an existing slot.
    #[must_use]
    pub const fn with_slot(slot: S) -> Self {
        Self { slot }
    }

    /// Pushes a single enricher.
    ///
    /// The returned bookmark restores the stack as it was before the push.
    pub fn push(&self, enricher: SharedEnricher) -> Bookmark<'_, S> {
        let saved = self.slot.load();
        self.slot.replace(saved.push(enricher));
        trace!(
            target: DIAGNOSTICS_TARGET,
            depth = saved.len() + 1,
            "pushed enricher onto log context"
        );
        Bookmark::new(&self.slot, saved)
    }

    /// Pushes a named property.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidArgument`](crate::ContextError) if the
    /// name is empty or the value cannot be captured. The stack is not
    /// modified in that case.
    pub fn push_property(
        &self,
        name: impl Into<String>,
        value: impl Serialize,
        destructure: bool,
    ) -> ContextResult<Bookmark<'_, S>> {
        let enricher = PropertyEnricher::new(name, value, destructure)?;
        Ok(self.push(enricher.shared()))
    }

    /// Pushes several enrichers as one batch.
    ///
    /// Enrichers are pushed in iteration order, so the last one ends up on
    /// top. The batch is assembled off to the side and published with a
    /// single replacement; the returned bookmark undoes the whole batch.
    pub fn push_many<I>(&self, enrichers: I) -> Bookmark<'_, S>
    where
        I: IntoIterator<Item = SharedEnricher>,
    {
        let saved = self.slot.load();
        let mut batch = 0_usize;
        let pushed = enrichers.into_iter().fold(saved.clone(), |stack, enricher| {
            batch += 1;
            stack.push(enricher)
        });
        self.slot.replace(pushed);
        trace!(target: DIAGNOSTICS_TARGET, batch, "pushed enricher batch onto log context");
        Bookmark::new(&self.slot, saved)
    }

    /// Hides every enricher until the returned bookmark is released.
    ///
    /// Releasing the bookmark restores the exact stack that was current when
    /// `suspend` was called, including everything below the top.
    pub fn suspend(&self) -> Bookmark<'_, S> {
        let saved = self.slot.replace(EnricherStack::empty());
        trace!(target: DIAGNOSTICS_TARGET, depth = saved.len(), "suspended log context");
        Bookmark::new(&self.slot, saved)
    }

    /// Clears the stack.
    ///
    /// Unlike [`suspend`](Self::suspend) nothing is returned to undo the
    /// clear. Bookmarks captured earlier still restore their own snapshots
    /// when released.
    pub fn reset(&self) {
        let previous = self.slot.replace(EnricherStack::empty());
        if !previous.is_empty() {
            debug!(
                target: DIAGNOSTICS_TARGET,
                discarded = previous.len(),
                "reset log context"
            );
        }
    }

    /// Returns a frozen view of the current stack, top first.
    #[must_use]
    pub fn snapshot(&self) -> EnricherStack {
        self.slot.load()
    }

    /// Returns the number of enrichers currently visible.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slot.load().len()
    }

    /// Returns `true` if no enrichers are visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.load().is_empty()
    }

    /// Applies every visible enricher to `record`, top of the stack first.
    pub fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        let stack = self.slot.load();
        for enricher in &stack {
            enricher.enrich(record, factory);
        }
    }

    /// Returns the underlying slot.
    #[must_use]
    pub const fn slot(&self) -> &S {
        &self.slot
    }
}

/// Restores a captured stack when released.
///
/// Release happens exactly once: on the first call to
/// [`release`](Self::release), or on drop. Further releases are no-ops.
#[must_use = "dropping a bookmark immediately restores the previous stack"]
pub struct Bookmark<'a, S: StackSlot> {
    slot: &'a S,
    saved: Option<EnricherStack>,
}

impl<'a, S: StackSlot> Bookmark<'a, S> {
    const fn new(slot: &'a S, saved: EnricherStack) -> Self {
        Self {
            slot,
            saved: Some(saved),
        }
    }

    /// Restores the captured stack now.
    pub fn release(&mut self) {
        if let Some(saved) = self.saved.take() {
            let _replaced = self.slot.replace(saved);
        }
    }

    /// Returns `true` until the bookmark has been released or detached.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.saved.is_some()
    }

    /// Returns the captured stack while the bookmark is armed.
    #[must_use]
    pub const fn saved(&self) -> Option<&EnricherStack> {
        self.saved.as_ref()
    }

    /// Disarms the bookmark so that nothing is restored.
    ///
    /// Whatever was pushed stays on the stack until a later reset or the
    /// release of an older bookmark.
    pub fn detach(mut self) {
        self.saved = None;
    }
}

impl<S: StackSlot> Drop for Bookmark<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: StackSlot> std::fmt::Debug for Bookmark<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bookmark")
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}
