#![forbid(unsafe_code)]

//! Callback state store: lifecycle buckets and their pure reducer.
//!
//! ```text
//! requested ──► prioritized ──► executing ──► executed ──► stored
//!     │              ▲              │            ▲
//!     └──► blocked ──┘              └─► watched ─┘
//! ```
//!
//! All mutation goes through [`reduce`] with a [`CallbackAction`]. A
//! transition between buckets is an [`CallbackAction::Aggregate`] of a
//! removal and an addition, applied in order as one step.
//!
//! # Invariants
//!
//! 1. An instance id appears in at most one bucket.
//! 2. Buckets are FIFO: additions append, removals keep relative order.
//! 3. `completed` only grows, by the count passed to `AddCompleted`.
//! 4. A bucket's version changes iff an action actually touched it.

use std::collections::HashSet;

use crate::callback::{Callback, InstanceId};

/// A lifecycle bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Requested,
    Prioritized,
    Blocked,
    Executing,
    Watched,
    Executed,
    Stored,
}

impl Bucket {
    pub const ALL: [Self; 7] = [
        Self::Requested,
        Self::Prioritized,
        Self::Blocked,
        Self::Executing,
        Self::Watched,
        Self::Executed,
        Self::Stored,
    ];

    /// Buckets holding callbacks that have been accepted but not yet run.
    pub const IN_FLIGHT: [Self; 4] = [Self::Prioritized, Self::Blocked, Self::Executing, Self::Watched];

    fn index(self) -> usize {
        self as usize
    }
}

/// The lifecycle buckets plus the completion counter.
#[derive(Debug, Clone, Default)]
pub struct CallbackState {
    pub requested: Vec<Callback>,
    pub prioritized: Vec<Callback>,
    pub blocked: Vec<Callback>,
    pub executing: Vec<Callback>,
    pub watched: Vec<Callback>,
    pub executed: Vec<Callback>,
    pub stored: Vec<Callback>,
    pub completed: u64,
}

impl CallbackState {
    #[must_use]
    pub fn bucket(&self, bucket: Bucket) -> &[Callback] {
        match bucket {
            Bucket::Requested => &self.requested,
            Bucket::Prioritized => &self.prioritized,
            Bucket::Blocked => &self.blocked,
            Bucket::Executing => &self.executing,
            Bucket::Watched => &self.watched,
            Bucket::Executed => &self.executed,
            Bucket::Stored => &self.stored,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Callback> {
        match bucket {
            Bucket::Requested => &mut self.requested,
            Bucket::Prioritized => &mut self.prioritized,
            Bucket::Blocked => &mut self.blocked,
            Bucket::Executing => &mut self.executing,
            Bucket::Watched => &mut self.watched,
            Bucket::Executed => &mut self.executed,
            Bucket::Stored => &mut self.stored,
        }
    }

    /// Which bucket holds `id`.
    #[must_use]
    pub fn locate(&self, id: InstanceId) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|b| self.bucket(*b).iter().any(|cb| cb.id() == id))
    }

    /// Callbacks in the given buckets, with their bucket.
    pub fn iter_buckets<'a>(&'a self, buckets: &'a [Bucket]) -> impl Iterator<Item = (Bucket, &'a Callback)> + 'a {
        buckets
            .iter()
            .flat_map(move |b| self.bucket(*b).iter().map(move |cb| (*b, cb)))
    }

    /// Nothing waits, runs or awaits bookkeeping.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        Bucket::ALL.iter().all(|b| self.bucket(*b).is_empty())
    }

    /// Every instance id is in at most one bucket.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        Bucket::ALL
            .iter()
            .flat_map(|b| self.bucket(*b))
            .all(|cb| seen.insert(cb.id()))
    }
}

/// A reducer input.
#[derive(Debug, Clone)]
pub enum CallbackAction {
    Add(Bucket, Vec<Callback>),
    Remove(Bucket, Vec<InstanceId>),
    AddCompleted(u64),
    Aggregate(Vec<CallbackAction>),
}

impl CallbackAction {
    /// Move `callbacks` from one bucket to another as one step.
    #[must_use]
    pub fn transition(from: Bucket, to: Bucket, callbacks: Vec<Callback>) -> Self {
        let ids = callbacks.iter().map(Callback::id).collect();
        Self::Aggregate(vec![Self::Remove(from, ids), Self::Add(to, callbacks)])
    }

    fn is_noop(&self) -> bool {
        match self {
            Self::Add(_, cbs) => cbs.is_empty(),
            Self::Remove(_, ids) => ids.is_empty(),
            Self::AddCompleted(n) => *n == 0,
            Self::Aggregate(actions) => actions.iter().all(Self::is_noop),
        }
    }
}

/// Apply `action` to `state`.
#[must_use]
pub fn reduce(mut state: CallbackState, action: CallbackAction) -> CallbackState {
    apply(&mut state, action, &mut |_| {});
    state
}

fn apply(state: &mut CallbackState, action: CallbackAction, touched: &mut dyn FnMut(Bucket)) {
    match action {
        CallbackAction::Add(bucket, callbacks) => {
            if !callbacks.is_empty() {
                state.bucket_mut(bucket).extend(callbacks);
                touched(bucket);
            }
        }
        CallbackAction::Remove(bucket, ids) => {
            if ids.is_empty() {
                return;
            }
            let ids: HashSet<InstanceId> = ids.into_iter().collect();
            let list = state.bucket_mut(bucket);
            let before = list.len();
            list.retain(|cb| !ids.contains(&cb.id()));
            if list.len() != before {
                touched(bucket);
            }
        }
        CallbackAction::AddCompleted(n) => {
            state.completed += n;
        }
        CallbackAction::Aggregate(actions) => {
            for action in actions {
                apply(state, action, touched);
            }
        }
    }
}

/// The state plus per-bucket versions for observers.
#[derive(Debug, Clone, Default)]
pub struct CallbackStore {
    state: CallbackState,
    versions: [u64; 7],
}

impl CallbackStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &CallbackState {
        &self.state
    }

    pub fn dispatch(&mut self, action: CallbackAction) {
        if action.is_noop() {
            return;
        }
        let versions = &mut self.versions;
        apply(&mut self.state, action, &mut |bucket| {
            versions[bucket.index()] += 1;
        });
        debug_assert!(self.state.is_consistent(), "instance present in two buckets");
    }

    #[must_use]
    pub fn version(&self, bucket: Bucket) -> u64 {
        self.versions[bucket.index()]
    }

    /// Sum of the versions of `buckets`; changes iff any of them changed.
    #[must_use]
    pub fn version_of(&self, buckets: &[Bucket]) -> u64 {
        buckets.iter().map(|b| self.version(*b)).sum()
    }

    /// Drop every callback; versions keep counting.
    pub fn clear(&mut self) {
        for bucket in Bucket::ALL {
            if !self.state.bucket(bucket).is_empty() {
                self.versions[bucket.index()] += 1;
            }
        }
        self.state = CallbackState::default();
    }
}
