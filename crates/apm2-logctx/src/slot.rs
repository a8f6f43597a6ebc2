//! Storage disciplines for the current stack reference.
//!
//! A [`StackSlot`] holds exactly one [`EnricherStack`] handle and supports two
//! operations: read it, and replace it wholesale. Every stack mutation is a
//! single replacement, so no broader locking is needed for an individual push,
//! pop, suspend or reset to be well-formed.
//!
//! Two disciplines are provided and deliberately kept apart:
//!
//! - [`AmbientSlot`]: thread-local storage. Each logical flow sees its own
//!   view; the helpers in [`crate::flow`] copy the reference at fork time and
//!   carry it across suspension points.
//! - [`SharedSlot`]: one cell visible to every thread and task.
//!
//! # Lost updates
//!
//! A push reads the slot, builds a node on top of what it read, and stores the
//! result. Two flows pushing through a [`SharedSlot`] at the same moment may
//! both build on the same base, and one push is lost. Callers that need a
//! multi-step sequence to be atomic serialize it with a
//! [`ScopeLock`](crate::ScopeLock).

use std::cell::RefCell;

use parking_lot::RwLock;

use crate::stack::EnricherStack;

/// A single mutable reference to the current stack.
pub trait StackSlot: Send + Sync {
    /// Returns the current stack.
    fn load(&self) -> EnricherStack;

    /// Installs `stack` and returns the stack it replaced.
    fn replace(&self, stack: EnricherStack) -> EnricherStack;
}

thread_local! {
    static AMBIENT: RefCell<EnricherStack> = const { RefCell::new(EnricherStack::empty()) };
}

/// Flow-local storage backed by a thread-local cell.
///
/// Reads and writes address the stack installed on the calling thread. Async
/// code keeps its view across `.await` points by running inside
/// [`ContextFutureExt::in_current_context`](crate::ContextFutureExt::in_current_context),
/// which installs the flow's stack for the duration of each poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmbientSlot;

impl StackSlot for AmbientSlot {
    fn load(&self) -> EnricherStack {
        // During thread teardown the cell may already be gone; an empty view
        // is the only sensible answer then.
        AMBIENT
            .try_with(|cell| cell.borrow().clone())
            .unwrap_or_default()
    }

    fn replace(&self, stack: EnricherStack) -> EnricherStack {
        AMBIENT
            .try_with(|cell| cell.replace(stack))
            .unwrap_or_default()
    }
}

/// Process-wide storage shared by every thread and task.
#[derive(Debug, Default)]
pub struct SharedSlot {
    current: RwLock<EnricherStack>,
}

impl SharedSlot {
    /// Creates an empty shared slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: parking_lot::const_rwlock(EnricherStack::empty()),
        }
    }
}

impl StackSlot for SharedSlot {
    fn load(&self) -> EnricherStack {
        self.current.read().clone()
    }

    fn replace(&self, stack: EnricherStack) -> EnricherStack {
        std::mem::replace(&mut *self.current.write(), stack)
    }
}
