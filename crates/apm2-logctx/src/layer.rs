//! Bridge between `tracing` and the context stacks.
//!
//! [`EnrichingLayer`] is registered once per subscriber. For every event it
//! builds a [`LogRecord`] from the event's message and fields, applies each
//! registered [`EnrichmentSource`] in registration order, and hands the
//! finished record to a [`RecordSink`].
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use apm2_logctx::{EnrichingLayer, LogContext, LogRecord};
//! use tracing_subscriber::layer::SubscriberExt;
//!
//! let records = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
//! let sink = {
//!     let records = Arc::clone(&records);
//!     move |record: LogRecord| records.lock().unwrap().push(record)
//! };
//!
//! let layer = EnrichingLayer::builder().from_log_context().build(sink);
//! let subscriber = tracing_subscriber::registry().with(layer);
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     let _scope = LogContext::push_property("RequestId", "r-1", false).unwrap();
//!     tracing::info!("handled");
//! });
//!
//! let records = records.lock().unwrap();
//! assert_eq!(records[0].property("RequestId").and_then(|v| v.as_str()), Some("r-1"));
//! ```
//!
//! # Precedence
//!
//! Event fields are written before any source runs, so a field logged
//! explicitly wins over a context entry with the same name. Within one source
//! the top of the stack is applied first.
//!
//! # Re-entrancy
//!
//! Nothing on the enrichment path emits `tracing` events. The crate's own
//! diagnostics (pushes, resets, lock handoffs) are skipped by the layer, so
//! they reach other layers such as a `fmt` layer but never the sink.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};

use crate::DIAGNOSTICS_TARGET;
use crate::context::ContextStack;
use crate::global::{GlobalLogContext, LogContext};
use crate::record::LogRecord;
use crate::slot::StackSlot;
use crate::value::{DefaultPropertyFactory, LogProperty, PropertyFactory, PropertyValue};

/// Name of the field `tracing` uses for the formatted message.
const MESSAGE_FIELD: &str = "message";

fn is_diagnostic(metadata: &Metadata<'_>) -> bool {
    metadata.target() == DIAGNOSTICS_TARGET
}

/// A read-only source of enrichment.
pub trait EnrichmentSource: Send + Sync {
    /// Applies this source to `record`.
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory);
}

impl<S: StackSlot> EnrichmentSource for ContextStack<S> {
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        ContextStack::enrich(self, record, factory);
    }
}

impl EnrichmentSource for LogContext {
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        Self::enrich(record, factory);
    }
}

impl EnrichmentSource for GlobalLogContext {
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        Self::enrich(record, factory);
    }
}

impl<T: EnrichmentSource + ?Sized> EnrichmentSource for Arc<T> {
    fn enrich(&self, record: &mut LogRecord, factory: &dyn PropertyFactory) {
        (**self).enrich(record, factory);
    }
}

/// Receives finished records.
pub trait RecordSink: Send + Sync + 'static {
    /// Consumes one record.
    fn emit(&self, record: LogRecord);
}

impl<F> RecordSink for F
where
    F: Fn(LogRecord) + Send + Sync + 'static,
{
    fn emit(&self, record: LogRecord) {
        self(record);
    }
}

/// Writes each record as one line of JSON.
///
/// A failed write drops that record and is counted in
/// [`failed_writes`](Self::failed_writes).
pub struct JsonLinesSink<W> {
    make_writer: W,
    failed_writes: AtomicU64,
}

impl<W> JsonLinesSink<W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    /// Creates a sink that writes through `make_writer`.
    pub const fn new(make_writer: W) -> Self {
        Self {
            make_writer,
            failed_writes: AtomicU64::new(0),
        }
    }

    /// Returns how many records could not be written.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }
}

impl<W> RecordSink for JsonLinesSink<W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fn emit(&self, record: LogRecord) {
        let mut line = record.to_json().to_string();
        line.push('\n');
        match self.make_writer.make_writer().write_all(line.as_bytes()) {
            Ok(()) => {},
            // Logging the failure would re-enter the dispatcher.
            Err(_) => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

impl<W> fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("failed_writes", &self.failed_writes.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A `tracing_subscriber` layer that enriches events from context stacks.
pub struct EnrichingLayer<K> {
    sources: Vec<Arc<dyn EnrichmentSource>>,
    factory: Arc<dyn PropertyFactory>,
    include_event_fields: bool,
    sink: K,
}

impl EnrichingLayer<()> {
    /// Starts building a layer.
    #[must_use]
    pub fn builder() -> EnrichingLayerBuilder {
        EnrichingLayerBuilder::default()
    }
}

impl<K: RecordSink> EnrichingLayer<K> {
    /// Builds the record for `event` without emitting it.
    pub fn build_record(&self, event: &Event<'_>) -> LogRecord {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(*metadata.level(), metadata.target(), visitor.message);
        if self.include_event_fields {
            for property in visitor.fields {
                record.add_or_update_property(property);
            }
        }

        for source in &self.sources {
            source.enrich(&mut record, self.factory.as_ref());
        }
        record
    }

    /// Returns the number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl<S, K> Layer<S> for EnrichingLayer<K>
where
    S: Subscriber,
    K: RecordSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if is_diagnostic(event.metadata()) {
            return;
        }
        let record = self.build_record(event);
        self.sink.emit(record);
    }
}

impl<K> fmt::Debug for EnrichingLayer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichingLayer")
            .field("sources", &self.sources.len())
            .field("include_event_fields", &self.include_event_fields)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EnrichingLayer`].
pub struct EnrichingLayerBuilder {
    sources: Vec<Arc<dyn EnrichmentSource>>,
    factory: Arc<dyn PropertyFactory>,
    include_event_fields: bool,
}

impl Default for EnrichingLayerBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            factory: Arc::new(DefaultPropertyFactory::new()),
            include_event_fields: true,
        }
    }
}

impl EnrichingLayerBuilder {
    /// Enriches from the ambient, flow-local context.
    #[must_use]
    pub fn from_log_context(self) -> Self {
        self.with_source(LogContext)
    }

    /// Enriches from the process-wide context.
    #[must_use]
    pub fn from_global_log_context(self) -> Self {
        self.with_source(GlobalLogContext)
    }

    /// Registers an additional source. Sources run in registration order.
    #[must_use]
    pub fn with_source(mut self, source: impl EnrichmentSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Replaces the property factory.
    #[must_use]
    pub fn with_factory(mut self, factory: impl PropertyFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Controls whether the event's own fields are copied into the record.
    #[must_use]
    pub const fn include_event_fields(mut self, include: bool) -> Self {
        self.include_event_fields = include;
        self
    }

    /// Finishes the layer with `sink` as its destination.
    #[must_use]
    pub fn build<K: RecordSink>(self, sink: K) -> EnrichingLayer<K> {
        EnrichingLayer {
            sources: self.sources,
            factory: self.factory,
            include_event_fields: self.include_event_fields,
            sink,
        }
    }
}

impl fmt::Debug for EnrichingLayerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichingLayerBuilder")
            .field("sources", &self.sources.len())
            .field("include_event_fields", &self.include_event_fields)
            .finish_non_exhaustive()
    }
}

/// Collects the message and fields of an event.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Vec<LogProperty>,
}

impl RecordVisitor {
    fn push(&mut self, field: &Field, value: PropertyValue) {
        self.fields.push(LogProperty::new(field.name(), value));
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            self.message = format!("{value:?}");
        } else {
            self.push(field, PropertyValue::Text(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = value.to_string();
        } else {
            self.push(field, PropertyValue::Text(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, PropertyValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let value = i64::try_from(value).map_or(PropertyValue::UInt(value), PropertyValue::Int);
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, PropertyValue::Float(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, PropertyValue::Bool(value));
    }
}
