//! # apm2-logctx
//!
//! Ambient log context: key/value enrichment attached to an implicit scope
//! and picked up by every log event emitted while the scope is active.
//!
//! Two storage disciplines share one set of operations:
//!
//! - [`LogContext`]: flow-local. Each thread, and each task wrapped with
//!   [`ContextFutureExt`], sees its own stack. Children inherit the parent's
//!   view at fork time and never leak changes back.
//! - [`GlobalLogContext`]: one stack for the whole process, with a
//!   [`ScopeLock`] for callers that need a multi-step update to be atomic.
//!
//! ## Core Concepts
//!
//! - **Enricher**: anything implementing [`Enrich`]; most often a named
//!   property created with [`PropertyEnricher`].
//! - **Stack**: an immutable, structurally shared [`EnricherStack`]. Every
//!   mutation publishes a new stack; existing snapshots never change.
//! - **Bookmark**: the guard returned by every push. Releasing it, or
//!   dropping it, restores the stack exactly as it was before the push.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use apm2_logctx::{EnrichingLayer, GlobalLogContext, LogRecord};
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let records = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
//! let sink = {
//!     let records = Arc::clone(&records);
//!     move |record: LogRecord| records.lock().unwrap().push(record)
//! };
//! let subscriber = tracing_subscriber::registry()
//!     .with(EnrichingLayer::builder().from_global_log_context().build(sink));
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     let _lock = GlobalLogContext::lock();
//!     let _outer = GlobalLogContext::push_property("A", 1, false)?;
//!     {
//!         let _inner = GlobalLogContext::push_property("A", 2, false)?;
//!         tracing::info!("inner");
//!     }
//!     tracing::info!("outer");
//!     Ok::<(), apm2_logctx::ContextError>(())
//! })?;
//!
//! let records = records.lock().unwrap();
//! assert_eq!(records[0].property("A").and_then(|v| v.as_i64()), Some(2));
//! assert_eq!(records[1].property("A").and_then(|v| v.as_i64()), Some(1));
//! # Ok::<(), apm2_logctx::ContextError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod enricher;
pub mod error;
pub mod flow;
pub mod global;
pub mod layer;
pub mod lock;
pub mod record;
pub mod slot;
pub mod stack;
pub mod value;

#[cfg(test)]
mod proptest_bookmark;

/// Target of the diagnostics this crate emits about its own operation.
///
/// [`EnrichingLayer`] never turns these into records.
pub const DIAGNOSTICS_TARGET: &str = env!("CARGO_CRATE_NAME");

// Re-export main types at crate root for convenience
pub use config::{ContextSource, EnrichmentConfig};
pub use context::{AmbientContext, Bookmark, ContextStack, SharedContext};
pub use enricher::{Enrich, PropertyEnricher, SharedEnricher, property};
pub use error::{ConfigError, ContextError, ContextResult};
pub use flow::{ContextFutureExt, WithContext};
pub use global::{GlobalLogContext, LogContext};
pub use layer::{EnrichingLayer, EnrichingLayerBuilder, EnrichmentSource, JsonLinesSink, RecordSink};
pub use lock::{LockToken, ScopeLock};
pub use record::LogRecord;
pub use slot::{AmbientSlot, SharedSlot, StackSlot};
pub use stack::EnricherStack;
pub use value::{DefaultPropertyFactory, LogProperty, PropertyFactory, PropertyValue};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::Bookmark;
    pub use crate::enricher::{Enrich, PropertyEnricher, SharedEnricher};
    pub use crate::error::{ContextError, ContextResult};
    pub use crate::flow::ContextFutureExt;
    pub use crate::global::{GlobalLogContext, LogContext};
    pub use crate::layer::{EnrichingLayer, RecordSink};
    pub use crate::lock::LockToken;
    pub use crate::record::LogRecord;
    pub use crate::value::{PropertyFactory, PropertyValue};
}
