#![forbid(unsafe_code)]

//! End-to-end scheduling scenarios through [`Engine`].
//!
//! Remote callbacks run on a manual backend: each dispatch parks a sender
//! the test answers explicitly, so every intermediate scheduler state is
//! observable.
//!
//! Run:
//!   cargo test -p plexus-runtime --test e2e_scheduling

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::mpsc::{Sender, channel};

use plexus_core::{ComponentId, DictId, IdValue};
use plexus_graph::Dependency;
use plexus_runtime::metrics;
use plexus_runtime::{
    Bucket, Callback, CallbackData, CallbackRequest, ClientsideRegistry, Engine, EngineConfig,
    Execution, ExecutionBackend, ExecutionResult, OutputValue, PendingExecution,
};
use serde_json::{Map, Value, json};

// ============================================================================
// Manual backend
// ============================================================================

struct Call {
    resolved_id: String,
    request: CallbackRequest,
    tx: Sender<ExecutionResult>,
}

#[derive(Clone, Default)]
struct Manual {
    calls: Rc<RefCell<Vec<Call>>>,
    dispatched: Rc<RefCell<Vec<String>>>,
}

impl ExecutionBackend for Manual {
    fn execute(&self, callback: &Callback, request: CallbackRequest) -> Execution {
        let (tx, rx) = channel();
        self.dispatched.borrow_mut().push(callback.resolved_id().to_string());
        self.calls.borrow_mut().push(Call {
            resolved_id: callback.resolved_id().to_string(),
            request,
            tx,
        });
        Execution::Pending(PendingExecution::new(rx))
    }
}

impl Manual {
    /// Resolved ids of unanswered calls, in dispatch order.
    fn waiting(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.resolved_id.clone()).collect()
    }

    fn take(&self, resolved_id: &str) -> Call {
        let mut calls = self.calls.borrow_mut();
        let pos = calls
            .iter()
            .position(|c| c.resolved_id == resolved_id)
            .unwrap_or_else(|| panic!("no call for {resolved_id}"));
        calls.remove(pos)
    }

    /// Answer the oldest call for `resolved_id`. False if its receiver is gone.
    fn respond(&self, resolved_id: &str, data: Value) -> bool {
        let call = self.take(resolved_id);
        let data: CallbackData = serde_json::from_value(data).unwrap();
        call.tx.send(Ok(data)).is_ok()
    }

    fn dispatch_count(&self, resolved_id: &str) -> usize {
        self.dispatched.borrow().iter().filter(|id| *id == resolved_id).count()
    }
}

fn props(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn inputs(ids: &[&str]) -> Value {
    let children: Vec<Value> = ids
        .iter()
        .map(|id| json!({"type": "Input", "props": {"id": id, "value": 0}}))
        .collect();
    json!({"type": "Div", "props": {"id": "root", "children": children}})
}

/// Outputs of running or runnable callbacks never overlap.
fn assert_no_co_writers(engine: &Engine) {
    let mut seen = BTreeSet::new();
    for (_, cb) in engine
        .state()
        .iter_buckets(&[Bucket::Prioritized, Bucket::Executing, Bucket::Watched])
    {
        for key in cb.output_keys(engine.paths()) {
            assert!(seen.insert(key.clone()), "{key} has two concurrent writers");
        }
    }
}

// ============================================================================
// Chained callbacks
// ============================================================================

fn chain() -> Vec<Dependency> {
    vec![
        Dependency::new(&[(json!("b"), "value")]).input(json!("a"), "value"),
        Dependency::new(&[(json!("c"), "value")]).input(json!("b"), "value"),
    ]
}

#[test]
fn chained_callbacks_run_in_order() {
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&chain(), inputs(&["a", "b", "c"]));

    assert_eq!(backend.waiting(), vec!["b.value"], "c.value waits on b.value");
    assert_eq!(engine.state().requested.len(), 1);
    assert!(engine.is_loading(&"b".into(), "value"));

    assert!(backend.respond("b.value", json!({"b": {"value": 2}})));
    engine.pump();
    assert_eq!(backend.waiting(), vec!["c.value"]);
    let call = backend.take("c.value");
    assert!(call.request.changed_prop_ids.contains(&"b.value".to_string()));
    assert_eq!(
        serde_json::to_value(&call.request.inputs).unwrap(),
        json!([{"id": "b", "property": "value", "value": 2}])
    );
    call.tx
        .send(Ok(serde_json::from_value(json!({"c": {"value": 3}})).unwrap()))
        .unwrap();
    engine.pump();

    assert!(engine.is_idle());
    assert_eq!(engine.state().completed, 2);
    assert_eq!(backend.dispatch_count("c.value"), 1, "merged, not run twice");
    assert_eq!(engine.read_prop(&"c".into(), "value"), Some(&json!(3)));
}

#[test]
fn one_write_drains_in_longest_chain_rounds() {
    // x0 -> x1 -> x2 -> x3, plus the shortcut x0 -> x2. Longest chain: 3.
    let deps = vec![
        Dependency::new(&[(json!("x1"), "value")])
            .input(json!("x0"), "value")
            .prevent_initial_call(),
        Dependency::new(&[(json!("x2"), "value")])
            .input(json!("x0"), "value")
            .input(json!("x1"), "value")
            .prevent_initial_call(),
        Dependency::new(&[(json!("x3"), "value")])
            .input(json!("x2"), "value")
            .prevent_initial_call(),
    ];
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&deps, inputs(&["x0", "x1", "x2", "x3"]));
    assert!(engine.is_idle());

    engine.set_props(&"x0".into(), props(&[("value", json!(1))])).unwrap();
    let mut rounds = 0;
    for (round, id) in ["x1", "x2", "x3"].into_iter().enumerate() {
        assert_no_co_writers(&engine);
        let key = format!("{id}.value");
        assert_eq!(backend.waiting(), vec![key.clone()], "round {round}");
        let mut response = Map::new();
        response.insert(id.to_string(), json!({"value": round + 1}));
        assert!(backend.respond(&key, Value::Object(response)));
        engine.pump();
        rounds += 1;
    }

    assert!(engine.is_idle());
    assert_eq!(rounds, 3);
    assert_eq!(engine.state().completed, 3);
    assert_eq!(backend.dispatch_count("x2.value"), 1);
}

#[test]
fn unchanged_output_prunes_downstream_initial_call() {
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&chain(), inputs(&["a", "b", "c"]));

    // b is already 0; writing 0 again changes nothing.
    assert!(backend.respond("b.value", json!({"b": {"value": 0}})));
    engine.pump();

    assert!(engine.is_idle());
    assert_eq!(backend.dispatch_count("c.value"), 0);
    assert_eq!(engine.state().completed, 1);
}

#[test]
fn prevented_update_prunes_downstream_initial_call() {
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&chain(), inputs(&["a", "b", "c"]));

    assert!(backend.respond("b.value", json!({})));
    engine.pump();

    assert!(engine.is_idle());
    assert_eq!(backend.dispatch_count("c.value"), 0);
}

// ============================================================================
// Dedup and supersession
// ============================================================================

#[test]
fn one_write_to_two_inputs_runs_once() {
    let deps = vec![
        Dependency::new(&[(json!("out"), "children")])
            .input(json!("a"), "value")
            .input(json!("a"), "n_clicks")
            .prevent_initial_call(),
    ];
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&deps, inputs(&["a", "out"]));
    assert!(backend.waiting().is_empty(), "prevent_initial_call");

    engine
        .set_props(&"a".into(), props(&[("value", json!(1)), ("n_clicks", json!(1))]))
        .unwrap();
    assert_eq!(backend.waiting(), vec!["out.children"]);
    let call = backend.take("out.children");
    assert_eq!(call.request.changed_prop_ids, vec!["a.n_clicks", "a.value"]);
}

#[test]
fn newer_request_supersedes_in_flight_one() {
    let deps = vec![
        Dependency::new(&[(json!("out"), "children")])
            .input(json!("a"), "value")
            .prevent_initial_call(),
    ];
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&deps, inputs(&["a", "out"]));

    let discarded = metrics::callbacks_discarded_total();
    engine.set_props(&"a".into(), props(&[("value", json!(1))])).unwrap();
    engine.set_props(&"a".into(), props(&[("value", json!(2))])).unwrap();
    assert_eq!(backend.waiting(), vec!["out.children", "out.children"]);
    assert!(metrics::callbacks_discarded_total() > discarded);

    assert!(
        !backend.respond("out.children", json!({"out": {"children": "stale"}})),
        "the superseded receiver is gone"
    );
    assert!(backend.respond("out.children", json!({"out": {"children": "fresh"}})));
    engine.pump();

    assert!(engine.is_idle());
    assert_eq!(engine.read_prop(&"out".into(), "children"), Some(&json!("fresh")));
    assert_eq!(engine.state().completed, 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrency_limit_holds_back_prioritized() {
    let deps: Vec<Dependency> = (0..4)
        .map(|i| {
            Dependency::new(&[(json!(format!("o{i}")), "value")])
                .input(json!("a"), "value")
                .prevent_initial_call()
        })
        .collect();
    let backend = Manual::default();
    let config = EngineConfig {
        max_concurrent: 2,
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, backend.clone());
    engine.hydrate(&deps, inputs(&["a", "o0", "o1", "o2", "o3"]));

    engine.set_props(&"a".into(), props(&[("value", json!(1))])).unwrap();
    assert_eq!(backend.waiting(), vec!["o0.value", "o1.value"]);
    assert_eq!(engine.state().prioritized.len(), 2);
    assert_no_co_writers(&engine);

    assert!(backend.respond("o0.value", json!({"o0": {"value": 1}})));
    engine.pump();
    assert_eq!(backend.waiting(), vec!["o1.value", "o2.value"]);
    assert_no_co_writers(&engine);

    for id in ["o1.value", "o2.value"] {
        assert!(backend.respond(id, json!({})));
    }
    engine.pump();
    assert!(backend.respond("o3.value", json!({})));
    engine.pump();
    assert!(engine.is_idle());
    assert_eq!(engine.state().completed, 4);
}

// ============================================================================
// Cycles
// ============================================================================

fn ping_pong() -> (Vec<Dependency>, ClientsideRegistry) {
    let deps = vec![
        Dependency::new(&[(json!("y"), "value")])
            .input(json!("x"), "value")
            .clientside("demo", "inc")
            .prevent_initial_call(),
        Dependency::new(&[(json!("x"), "value")])
            .input(json!("y"), "value")
            .clientside("demo", "inc")
            .prevent_initial_call(),
    ];
    let mut clientside = ClientsideRegistry::new();
    clientside.register("demo", "inc", |ctx| {
        let n = ctx.input(0).as_i64().unwrap_or(0);
        Ok(vec![OutputValue::Value(json!(n + 1))])
    });
    (deps, clientside)
}

#[test]
fn runtime_cycle_is_reported_and_stops() {
    let (deps, clientside) = ping_pong();
    let backend = plexus_runtime::BackendRouter::new(clientside, None);
    let mut engine = Engine::new(EngineConfig::default(), backend);
    engine.hydrate(&deps, inputs(&["x", "y"]));

    let circular = metrics::callbacks_circular_total();
    engine.set_props(&"x".into(), props(&[("value", json!(1))])).unwrap();

    assert!(engine.is_idle());
    assert!(metrics::callbacks_circular_total() > circular);
    let messages: Vec<&str> = engine
        .errors()
        .front_end()
        .iter()
        .map(|r| r.message.as_str())
        .collect();
    assert!(messages.iter().any(|m| m.contains("circular")), "{messages:?}");
    assert_eq!(engine.read_prop(&"y".into(), "value"), Some(&json!(2)));
}

#[test]
fn mutually_waiting_initial_calls_are_dropped() {
    let deps = vec![
        Dependency::new(&[(json!("y"), "value")]).input(json!("x"), "value"),
        Dependency::new(&[(json!("x"), "value")]).input(json!("y"), "value"),
    ];
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&deps, inputs(&["x", "y"]));

    assert!(backend.waiting().is_empty());
    assert!(engine.is_idle());
    assert_eq!(engine.errors().front_end().len(), 2);
}

// ============================================================================
// Graph rejection at hydration
// ============================================================================

#[test]
fn duplicate_output_is_rejected_and_first_wins() {
    let deps = vec![
        Dependency::new(&[(json!("out"), "value")])
            .input(json!("a"), "value")
            .prevent_initial_call(),
        Dependency::new(&[(json!("out"), "value")])
            .input(json!("b"), "value")
            .prevent_initial_call(),
    ];
    let backend = Manual::default();
    let mut engine = Engine::new(EngineConfig::default(), backend.clone());
    engine.hydrate(&deps, inputs(&["a", "b", "out"]));

    assert_eq!(engine.graph().len(), 1);
    assert_eq!(engine.errors().front_end().len(), 1);

    engine.set_props(&"b".into(), props(&[("value", json!(1))])).unwrap();
    assert!(backend.waiting().is_empty());
    engine.set_props(&"a".into(), props(&[("value", json!(1))])).unwrap();
    assert_eq!(backend.waiting(), vec!["out.value"]);
}

// ============================================================================
// Wildcards
// ============================================================================

fn running_sums() -> (Vec<Dependency>, Value, ClientsideRegistry) {
    let deps = vec![
        Dependency::new(&[(json!({"type": "sum", "index": ["MATCH"]}), "children")])
            .input(json!({"type": "row", "index": ["MATCH"]}), "value")
            .state(json!({"type": "row", "index": ["ALLSMALLER"]}), "value")
            .clientside("demo", "running_sum"),
    ];
    let mut children = Vec::new();
    for (i, v) in [1, 2, 3].into_iter().enumerate() {
        children.push(json!({"type": "Input", "props": {"id": {"type": "row", "index": i}, "value": v}}));
        children.push(json!({"type": "Div", "props": {"id": {"type": "sum", "index": i}}}));
    }
    let layout = json!({"type": "Div", "props": {"id": "root", "children": children}});
    let mut clientside = ClientsideRegistry::new();
    clientside.register("demo", "running_sum", |ctx| {
        let own = ctx.input(0).as_i64().unwrap_or(0);
        let before: i64 = ctx
            .state(0)
            .as_array()
            .map(|vs| vs.iter().filter_map(Value::as_i64).sum())
            .unwrap_or(0);
        Ok(vec![OutputValue::Value(json!(own + before))])
    });
    (deps, layout, clientside)
}

fn sum_id(i: i64) -> ComponentId {
    DictId::of([("type", IdValue::from("sum")), ("index", IdValue::from(i))]).into()
}

#[test]
fn allsmaller_is_bound_by_match() {
    let (deps, layout, clientside) = running_sums();
    let backend = plexus_runtime::BackendRouter::new(clientside, None);
    let mut engine = Engine::new(EngineConfig::default(), backend);
    engine.hydrate(&deps, layout);

    assert!(engine.is_idle());
    assert_eq!(engine.state().completed, 3, "one instance per MATCH value");
    assert_eq!(engine.read_prop(&sum_id(0), "children"), Some(&json!(1)));
    assert_eq!(engine.read_prop(&sum_id(1), "children"), Some(&json!(3)));
    assert_eq!(engine.read_prop(&sum_id(2), "children"), Some(&json!(6)));

    let row1: ComponentId = DictId::of([("type", IdValue::from("row")), ("index", IdValue::from(1))]).into();
    engine.set_props(&row1, props(&[("value", json!(10))])).unwrap();
    assert_eq!(engine.read_prop(&sum_id(1), "children"), Some(&json!(11)));
    assert_eq!(
        engine.read_prop(&sum_id(2), "children"),
        Some(&json!(6)),
        "state does not trigger"
    );
}

#[test]
fn added_rows_refire_all_readers() {
    let deps = vec![
        Dependency::new(&[(json!("rows"), "children")])
            .input(json!("add"), "n_clicks")
            .clientside("demo", "rows")
            .prevent_initial_call(),
        Dependency::new(&[(json!("total"), "children")])
            .input(json!({"type": "row", "index": ["ALL"]}), "value")
            .clientside("demo", "total"),
    ];
    let mut clientside = ClientsideRegistry::new();
    clientside.register("demo", "rows", |ctx| {
        let n = ctx.input(0).as_u64().unwrap_or(0);
        let rows: Vec<Value> = (0..n)
            .map(|i| json!({"type": "Input", "props": {"id": {"type": "row", "index": i}, "value": 1}}))
            .collect();
        Ok(vec![OutputValue::Value(Value::Array(rows))])
    });
    clientside.register("demo", "total", |ctx| {
        let total: i64 = ctx
            .input(0)
            .as_array()
            .map(|vs| vs.iter().filter_map(Value::as_i64).sum())
            .unwrap_or(0);
        Ok(vec![OutputValue::Value(json!(total))])
    });
    let layout = json!({"type": "Div", "props": {"id": "root", "children": [
        {"type": "Button", "props": {"id": "add", "n_clicks": 0}},
        {"type": "Div", "props": {"id": "rows", "children": []}},
        {"type": "Div", "props": {"id": "total"}}
    ]}});
    let backend = plexus_runtime::BackendRouter::new(clientside, None);
    let mut engine = Engine::new(EngineConfig::default(), backend);
    engine.hydrate(&deps, layout);
    assert_eq!(engine.read_prop(&"total".into(), "children"), Some(&json!(0)));

    engine.set_props(&"add".into(), props(&[("n_clicks", json!(3))])).unwrap();
    assert!(engine.is_idle());
    assert_eq!(engine.read_prop(&"total".into(), "children"), Some(&json!(3)));

    engine.set_props(&"add".into(), props(&[("n_clicks", json!(1))])).unwrap();
    assert_eq!(engine.read_prop(&"total".into(), "children"), Some(&json!(1)));
}
