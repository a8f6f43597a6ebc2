//! Persistent, immutable stack of enrichers.
//!
//! # Invariants
//!
//! - [INV-ST-001] Nodes are never mutated after construction. Pushing creates
//!   a new node whose tail is the previous stack; popping is taking the tail.
//! - [INV-ST-002] Any holder of an [`EnricherStack`] holds a frozen view. A
//!   walk over it is unaffected by pushes made through other handles.
//! - [INV-ST-003] Many stacks may share one tail. A node lives as long as any
//!   stack, bookmark or in-progress walk references it or a node above it.

use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::enricher::SharedEnricher;

struct Node {
    enricher: SharedEnricher,
    rest: EnricherStack,
}

impl Drop for Node {
    fn drop(&mut self) {
        // Unlink uniquely owned tails one at a time so that dropping a deep
        // stack does not recurse once per node.
        let mut next = self.rest.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.rest.head.take(),
                Err(_) => break,
            }
        }
    }
}

/// A persistent stack of enrichers, most recently pushed first.
///
/// Cloning is a reference count increment. Two stacks compare equal with
/// [`EnricherStack::ptr_eq`] when they are the same snapshot.
#[derive(Clone, Default)]
pub struct EnricherStack {
    head: Option<Arc<Node>>,
}

impl EnricherStack {
    /// The empty stack.
    #[must_use]
    pub const fn empty() -> Self {
        Self { head: None }
    }

    /// Returns `true` if the stack holds no enrichers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns a new stack with `enricher` on top of this one.
    #[must_use]
    pub fn push(&self, enricher: SharedEnricher) -> Self {
        Self {
            head: Some(Arc::new(Node {
                enricher,
                rest: self.clone(),
            })),
        }
    }

    /// Returns the enricher on top, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&SharedEnricher> {
        self.head.as_ref().map(|node| &node.enricher)
    }

    /// Returns the stack below the top, or the empty stack if this one is
    /// empty.
    #[must_use]
    pub fn tail(&self) -> Self {
        self.head
            .as_ref()
            .map_or_else(Self::empty, |node| node.rest.clone())
    }

    /// Returns the number of enrichers on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterates from the most recently pushed enricher to the oldest.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    /// Returns `true` if both handles refer to the same snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for EnricherStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnricherStack")
            .field("depth", &self.len())
            .finish()
    }
}

impl FromIterator<SharedEnricher> for EnricherStack {
    /// Pushes each enricher in turn, so the last one ends up on top.
    fn from_iter<I: IntoIterator<Item = SharedEnricher>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |stack, enricher| stack.push(enricher))
    }
}

impl<'a> IntoIterator for &'a EnricherStack {
    type Item = &'a SharedEnricher;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Top-to-bottom iterator over an [`EnricherStack`].
#[derive(Clone)]
pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a SharedEnricher;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.rest.head.as_deref();
        Some(&node.enricher)
    }
}

impl FusedIterator for Iter<'_> {}
