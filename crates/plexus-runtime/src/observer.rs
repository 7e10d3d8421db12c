#![forbid(unsafe_code)]

//! Observer bookkeeping for the scheduler loop.
//!
//! Each observer watches a set of buckets. It runs when the combined version
//! of those buckets differs from what it saw on its previous run. Observers
//! run in [`Observer::ORDER`] each pass, so within one pass completed results
//! are written and pruned before promotion decides what runs next.

use crate::store::Bucket;

/// The scheduler's reactions to state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observer {
    /// `executed → stored`.
    Completion,
    /// Prunes requested callbacks against stored records.
    Stored,
    /// `requested → prioritized | blocked`, `blocked → prioritized`.
    Promotion,
    /// `prioritized → executing`.
    Dispatch,
    /// `executing → watched | executed`.
    Watch,
}

impl Observer {
    pub const ORDER: [Self; 5] = [
        Self::Completion,
        Self::Stored,
        Self::Promotion,
        Self::Dispatch,
        Self::Watch,
    ];

    /// Buckets whose changes wake this observer.
    #[must_use]
    pub fn inputs(self) -> &'static [Bucket] {
        match self {
            Self::Completion => &[Bucket::Executed],
            Self::Stored => &[Bucket::Stored],
            Self::Promotion => &[
                Bucket::Requested,
                Bucket::Prioritized,
                Bucket::Blocked,
                Bucket::Executing,
                Bucket::Watched,
                Bucket::Executed,
            ],
            Self::Dispatch => &[Bucket::Prioritized, Bucket::Executing, Bucket::Watched],
            Self::Watch => &[Bucket::Executing],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Completion => "complete",
            Self::Stored => "stored",
            Self::Promotion => "promote",
            Self::Dispatch => "dispatch",
            Self::Watch => "watch",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Last input version each observer ran against.
#[derive(Debug, Clone, Default)]
pub struct ObserverSet {
    last_seen: [Option<u64>; 5],
}

impl ObserverSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True (and recorded) if `version` is new for `observer`.
    pub fn should_run(&mut self, observer: Observer, version: u64) -> bool {
        let slot = &mut self.last_seen[observer.index()];
        if *slot == Some(version) {
            return false;
        }
        *slot = Some(version);
        true
    }

    pub fn reset(&mut self) {
        self.last_seen = [None; 5];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_once_per_version() {
        let mut set = ObserverSet::new();
        assert!(set.should_run(Observer::Dispatch, 0));
        assert!(!set.should_run(Observer::Dispatch, 0));
        assert!(set.should_run(Observer::Dispatch, 1));
        assert!(set.should_run(Observer::Watch, 1), "observers are tracked separately");
        set.reset();
        assert!(set.should_run(Observer::Dispatch, 1));
    }

    #[test]
    fn completion_runs_before_promotion() {
        let pos = |o| Observer::ORDER.iter().position(|x| *x == o).unwrap();
        assert!(pos(Observer::Completion) < pos(Observer::Stored));
        assert!(pos(Observer::Stored) < pos(Observer::Promotion));
        assert!(pos(Observer::Promotion) < pos(Observer::Dispatch));
    }
}
