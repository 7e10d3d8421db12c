#![forbid(unsafe_code)]

//! Span and event coverage for the scheduler.
//!
//! Every observer run opens a `scheduler.*` span under the operation that
//! drove it, completion spans carry `duration_us`, and circular dependencies
//! are reported as `ERROR` events.
//!
//! Run:
//!   cargo test -p plexus-runtime --test tracing_spans

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use plexus_graph::Dependency;
use plexus_runtime::{BackendRouter, ClientsideRegistry, Engine, EngineConfig, OutputValue};
use serde_json::{Value, json};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

// ============================================================================
// Capture layer
// ============================================================================

#[derive(Debug, Clone)]
#[allow(dead_code)]
struct CapturedSpan {
    name: String,
    target: String,
    level: tracing::Level,
    fields: HashMap<String, String>,
    parent_name: Option<String>,
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
struct CapturedEvent {
    level: tracing::Level,
    target: String,
    message: String,
    fields: HashMap<String, String>,
}

struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    span_index: Arc<Mutex<HashMap<u64, usize>>>,
}

struct CaptureHandle {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureHandle {
    fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }

    fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> tracing_subscriber::Layer<S> for SpanCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);
        let parent_name = ctx
            .current_span()
            .id()
            .and_then(|pid| ctx.span(pid))
            .map(|span_ref| span_ref.name().to_string());

        let mut fields: HashMap<String, String> = visitor.0.into_iter().collect();
        for field in attrs.metadata().fields() {
            fields.entry(field.name().to_string()).or_default();
        }

        let mut spans = self.spans.lock().unwrap();
        let idx = spans.len();
        spans.push(CapturedSpan {
            name: attrs.metadata().name().to_string(),
            target: attrs.metadata().target().to_string(),
            level: *attrs.metadata().level(),
            fields,
            parent_name,
        });
        self.span_index.lock().unwrap().insert(id.into_u64(), idx);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        values.record(&mut visitor);
        let index = self.span_index.lock().unwrap();
        if let Some(&idx) = index.get(&id.into_u64()) {
            let mut spans = self.spans.lock().unwrap();
            if let Some(span) = spans.get_mut(idx) {
                for (k, v) in visitor.0 {
                    span.fields.insert(k, v);
                }
            }
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        let message = visitor
            .0
            .iter()
            .find(|(k, _)| k == "message")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message,
            fields: visitor.0.into_iter().collect(),
        });
    }
}

fn with_captured_spans<F>(f: F) -> CaptureHandle
where
    F: FnOnce(),
{
    let spans = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCapture {
        spans: spans.clone(),
        events: events.clone(),
        span_index: Arc::new(Mutex::new(HashMap::new())),
    };
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::TRACE)
        .with(layer);
    tracing::subscriber::with_default(subscriber, f);
    CaptureHandle { spans, events }
}

// ============================================================================
// Fixtures
// ============================================================================

fn engine(deps: &[Dependency], layout: Value) -> Engine {
    let mut clientside = ClientsideRegistry::new();
    clientside.register("demo", "inc", |ctx| {
        let n = ctx.input(0).as_i64().unwrap_or(0);
        Ok(vec![OutputValue::Value(json!(n + 1))])
    });
    let mut engine = Engine::new(EngineConfig::default(), BackendRouter::new(clientside, None));
    engine.hydrate(deps, layout);
    engine
}

fn layout(ids: &[&str]) -> Value {
    let children: Vec<Value> = ids
        .iter()
        .map(|id| json!({"type": "Input", "props": {"id": id, "value": 0}}))
        .collect();
    json!({"type": "Div", "props": {"id": "root", "children": children}})
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn every_observer_opens_a_span_under_hydrate() {
    let deps = vec![
        Dependency::new(&[(json!("b"), "value")])
            .input(json!("a"), "value")
            .clientside("demo", "inc"),
    ];
    let handle = with_captured_spans(|| {
        let _ = engine(&deps, layout(&["a", "b"]));
    });

    for name in [
        "scheduler.promote",
        "scheduler.dispatch",
        "scheduler.watch",
        "scheduler.complete",
    ] {
        let spans = handle.spans_named(name);
        assert!(!spans.is_empty(), "missing span {name}");
        for span in spans {
            assert_eq!(span.target, "plexus.scheduler");
            assert_eq!(span.level, tracing::Level::DEBUG);
            assert_eq!(span.parent_name.as_deref(), Some("engine.hydrate"), "{name}");
        }
    }
}

#[test]
fn completion_records_counts_and_duration() {
    let deps = vec![
        Dependency::new(&[(json!("b"), "value")])
            .input(json!("a"), "value")
            .clientside("demo", "inc"),
    ];
    let handle = with_captured_spans(|| {
        let _ = engine(&deps, layout(&["a", "b"]));
    });

    let complete = handle.spans_named("scheduler.complete");
    assert_eq!(complete.len(), 1);
    let fields = &complete[0].fields;
    assert_eq!(fields.get("callbacks").map(String::as_str), Some("1"));
    assert_eq!(fields.get("failed").map(String::as_str), Some("0"));
    assert!(
        fields.get("duration_us").is_some_and(|v| !v.is_empty()),
        "duration_us recorded: {fields:?}"
    );

    let promote = handle.spans_named("scheduler.promote");
    assert_eq!(promote[0].fields.get("prioritized").map(String::as_str), Some("1"));
}

#[test]
fn circular_dependency_is_an_error_event() {
    let deps = vec![
        Dependency::new(&[(json!("y"), "value")])
            .input(json!("x"), "value")
            .clientside("demo", "inc"),
        Dependency::new(&[(json!("x"), "value")])
            .input(json!("y"), "value")
            .clientside("demo", "inc"),
    ];
    let handle = with_captured_spans(|| {
        let _ = engine(&deps, layout(&["x", "y"]));
    });

    let errors: Vec<CapturedEvent> = handle
        .events()
        .into_iter()
        .filter(|e| e.level == tracing::Level::ERROR)
        .collect();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().all(|e| e.target == "plexus.scheduler"));
    assert!(errors.iter().all(|e| e.message == "circular dependency"));
}

#[test]
fn rejected_declaration_is_a_graph_warning() {
    let deps = vec![
        Dependency::new(&[(json!("out"), "value")]).input(json!("out"), "value"),
    ];
    let handle = with_captured_spans(|| {
        let _ = engine(&deps, layout(&["out"]));
    });

    let warnings: Vec<CapturedEvent> = handle
        .events()
        .into_iter()
        .filter(|e| e.level == tracing::Level::WARN && e.target == "plexus.graph")
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "rejected callback declaration");
}
