#![forbid(unsafe_code)]

//! Property tests for the callback state store.
//!
//! Random sequences of bucket transitions must keep every instance in at
//! most one bucket, keep bucket order FIFO, and bump a bucket's version
//! exactly when its contents change.
//!
//! Run:
//!   cargo test -p plexus-runtime --test proptest_store_invariants

use std::sync::Arc;

use plexus_graph::{Dependency, DependencyGraph, ResolvedCallback};
use plexus_runtime::{Bucket, Callback, CallbackAction, CallbackState, CallbackStore, InstanceId, reduce};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Request(usize),
    Move { pick: usize, to: usize },
    Drop { pick: usize },
    Complete(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..4).prop_map(Op::Request),
        (any::<usize>(), 0usize..7).prop_map(|(pick, to)| Op::Move { pick, to }),
        any::<usize>().prop_map(|pick| Op::Drop { pick }),
        (0u64..3).prop_map(Op::Complete),
    ]
}

fn template() -> Arc<ResolvedCallback> {
    let graph = DependencyGraph::build(&[Dependency::new(&[(json!("out"), "children")]).input(json!("in"), "value")]);
    Arc::new(ResolvedCallback::new(Arc::clone(&graph.callbacks()[0]), None))
}

fn fresh(template: &Arc<ResolvedCallback>) -> Callback {
    Callback::new((**template).clone())
}

fn all(state: &CallbackState) -> Vec<(Bucket, InstanceId)> {
    state.iter_buckets(&Bucket::ALL).map(|(b, cb)| (b, cb.id())).collect()
}

/// Turn an op into an action against the current state.
fn action(state: &CallbackState, template: &Arc<ResolvedCallback>, op: &Op) -> Option<CallbackAction> {
    let present = all(state);
    match op {
        Op::Request(n) => Some(CallbackAction::Add(
            Bucket::Requested,
            (0..*n).map(|_| fresh(template)).collect(),
        )),
        Op::Move { pick, to } => {
            if present.is_empty() {
                return None;
            }
            let (from, id) = present[pick % present.len()];
            if from == Bucket::ALL[*to] {
                return None;
            }
            let cb = state.bucket(from).iter().find(|cb| cb.id() == id)?.clone();
            Some(CallbackAction::transition(from, Bucket::ALL[*to], vec![cb]))
        }
        Op::Drop { pick } => {
            if present.is_empty() {
                return None;
            }
            let (from, id) = present[pick % present.len()];
            Some(CallbackAction::Remove(from, vec![id]))
        }
        Op::Complete(n) => Some(CallbackAction::AddCompleted(*n)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn instances_never_duplicate(ops in prop::collection::vec(op(), 1..60)) {
        let template = template();
        let mut store = CallbackStore::new();
        let mut completed = 0;
        for op in &ops {
            let Some(action) = action(store.state(), &template, op) else { continue };
            if let Op::Complete(n) = op {
                completed += n;
            }
            store.dispatch(action);
            prop_assert!(store.state().is_consistent());
        }
        prop_assert_eq!(store.state().completed, completed);
    }

    #[test]
    fn versions_move_iff_bucket_changes(ops in prop::collection::vec(op(), 1..60)) {
        let template = template();
        let mut store = CallbackStore::new();
        for op in &ops {
            let Some(action) = action(store.state(), &template, op) else { continue };
            let before: Vec<Vec<InstanceId>> = Bucket::ALL
                .iter()
                .map(|b| store.state().bucket(*b).iter().map(Callback::id).collect())
                .collect();
            let versions: Vec<u64> = Bucket::ALL.iter().map(|b| store.version(*b)).collect();
            store.dispatch(action);
            for (i, bucket) in Bucket::ALL.iter().enumerate() {
                let after: Vec<InstanceId> = store.state().bucket(*bucket).iter().map(Callback::id).collect();
                let changed = after != before[i];
                prop_assert_eq!(
                    store.version(*bucket) != versions[i],
                    changed,
                    "bucket {:?}", bucket
                );
            }
        }
    }

    #[test]
    fn store_matches_pure_reducer(ops in prop::collection::vec(op(), 1..40)) {
        let template = template();
        let mut store = CallbackStore::new();
        let mut state = CallbackState::default();
        for op in &ops {
            let Some(action) = action(store.state(), &template, op) else { continue };
            state = reduce(state, action.clone());
            store.dispatch(action);
            prop_assert_eq!(all(&state), all(store.state()));
        }
    }

    #[test]
    fn transitions_append_at_the_back(n in 2usize..8, pick in any::<usize>()) {
        let template = template();
        let mut store = CallbackStore::new();
        let cbs: Vec<Callback> = (0..n).map(|_| fresh(&template)).collect();
        store.dispatch(CallbackAction::Add(Bucket::Requested, cbs.clone()));
        store.dispatch(CallbackAction::Add(Bucket::Prioritized, vec![fresh(&template)]));
        let moved = cbs[pick % n].clone();
        store.dispatch(CallbackAction::transition(Bucket::Requested, Bucket::Prioritized, vec![moved.clone()]));

        let prioritized = &store.state().prioritized;
        prop_assert_eq!(prioritized.last().map(Callback::id), Some(moved.id()));
        let left: Vec<InstanceId> = store.state().requested.iter().map(Callback::id).collect();
        let expected: Vec<InstanceId> = cbs.iter().map(Callback::id).filter(|id| *id != moved.id()).collect();
        prop_assert_eq!(left, expected);
    }
}
