//! The enriching layer wired from configuration, reading both disciplines.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use apm2_logctx::{
    ContextSource, DIAGNOSTICS_TARGET, EnrichmentConfig, GlobalLogContext, JsonLinesSink,
    LogContext, LogRecord, PropertyValue,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Counts the crate's own diagnostics as seen by an unrelated layer.
#[derive(Clone, Default)]
struct DiagnosticCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for DiagnosticCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() == DIAGNOSTICS_TARGET {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Buffer {
    fn lines(&self) -> Vec<serde_json::Value> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[derive(Serialize)]
struct Position {
    latitude: f64,
    longitude: f64,
}

#[test]
fn test_default_config_reads_ambient_before_global() {
    let _lock = GlobalLogContext::lock();
    GlobalLogContext::reset();

    let records = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
    let sink = {
        let records = Arc::clone(&records);
        move |record: LogRecord| records.lock().push(record)
    };
    let config = EnrichmentConfig::default();
    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(config.layer_builder().build(sink));

    let _global = GlobalLogContext::push_property("Who", "global", false).unwrap();
    let _version = GlobalLogContext::push_property("Version", "1.0", false).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        let _ambient = LogContext::push_property("Who", "ambient", false).unwrap();
        tracing::info!("first");
        tracing::info!(Who = "event", "second");
    });

    let records = records.lock();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].property("Who"), Some(&PropertyValue::from("ambient")));
    assert_eq!(records[0].property("Version"), Some(&PropertyValue::from("1.0")));
    assert_eq!(records[1].property("Who"), Some(&PropertyValue::from("event")));
}

#[test]
fn test_configured_global_only_layer_writes_json_lines() {
    let _lock = GlobalLogContext::lock();
    GlobalLogContext::reset();

    let config = EnrichmentConfig::from_toml(
        r#"
        sources = ["global"]
        include_event_fields = false
        "#,
    )
    .unwrap();
    assert_eq!(config.sources, vec![ContextSource::Global]);

    let buffer = Buffer::default();
    let make_writer = {
        let buffer = buffer.clone();
        move || buffer.clone()
    };
    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(config.layer_builder().build(JsonLinesSink::new(make_writer)));

    let position = Position {
        latitude: 25.0,
        longitude: 134.0,
    };
    let _structured = GlobalLogContext::push_property("Position", &position, true).unwrap();
    let _flat = GlobalLogContext::push_property("Flat", &position, false).unwrap();

    tracing::subscriber::with_default(subscriber, || {
        let _ambient = LogContext::push_property("Ignored", 1, false).unwrap();
        tracing::warn!(field = 1, "hello");
    });

    let lines = buffer.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["level"], "WARN");
    assert_eq!(line["message"], "hello");
    assert_eq!(line["properties"]["Position"]["latitude"], 25.0);
    assert!(line["properties"]["Flat"].is_string());
    assert!(line["properties"].get("Ignored").is_none());
    assert!(line["properties"].get("field").is_none());
}

#[test]
fn test_destructuring_depth_from_config() {
    let _lock = GlobalLogContext::lock();
    GlobalLogContext::reset();

    let config = EnrichmentConfig::from_toml(
        r#"
        sources = ["global"]
        max_destructuring_depth = 1
        "#,
    )
    .unwrap();
    let records = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
    let sink = {
        let records = Arc::clone(&records);
        move |record: LogRecord| records.lock().push(record)
    };
    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(config.layer_builder().build(sink));

    let nested = serde_json::json!({ "outer": { "inner": 1 } });
    let _nested = GlobalLogContext::push_property("Nested", &nested, true).unwrap();

    tracing::subscriber::with_default(subscriber, || tracing::info!("deep"));

    let records = records.lock();
    let PropertyValue::Structure(fields) = records[0].property("Nested").unwrap() else {
        panic!("expected a structure");
    };
    let Some(PropertyValue::Structure(outer)) = fields.get("outer") else {
        panic!("expected the first level to be destructured");
    };
    assert_eq!(outer.get("inner"), Some(&PropertyValue::Null));
}

#[test]
fn test_context_diagnostics_are_not_records() {
    let records = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
    let sink = {
        let records = Arc::clone(&records);
        move |record: LogRecord| records.lock().push(record)
    };
    let diagnostics = DiagnosticCounter::default();
    let subscriber = tracing_subscriber::registry()
        .with(diagnostics.clone())
        .with(EnrichmentConfig::default().layer_builder().build(sink));

    tracing::subscriber::with_default(subscriber, || {
        let _lock = GlobalLogContext::lock();
        GlobalLogContext::reset();
        let _ambient = LogContext::push_property("A", 1, false).unwrap();
        let _global = GlobalLogContext::push_property("B", 2, false).unwrap();
        GlobalLogContext::reset();
        assert!(records.lock().is_empty());

        tracing::info!("user event");
    });

    assert!(diagnostics.0.load(Ordering::SeqCst) >= 4);
    let records = records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message(), "user event");
    assert_eq!(records[0].property("A"), Some(&PropertyValue::Int(1)));
}
