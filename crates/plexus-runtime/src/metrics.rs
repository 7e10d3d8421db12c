#![forbid(unsafe_code)]

//! Process-wide monotonic counters for callback scheduling.
//!
//! Counters are shared by every engine in the process; tests compare deltas.

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Monotonic counters
// ---------------------------------------------------------------------------

static CALLBACKS_DISPATCHED_TOTAL: AtomicU64 = AtomicU64::new(0);
static CALLBACKS_COMPLETED_TOTAL: AtomicU64 = AtomicU64::new(0);
static CALLBACKS_FAILED_TOTAL: AtomicU64 = AtomicU64::new(0);
static CALLBACKS_DISCARDED_TOTAL: AtomicU64 = AtomicU64::new(0);
static CALLBACKS_CIRCULAR_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Callbacks handed to a backend.
#[must_use]
pub fn callbacks_dispatched_total() -> u64 {
    CALLBACKS_DISPATCHED_TOTAL.load(Ordering::Relaxed)
}

/// Callbacks moved from `executed` to `stored`, successful or not.
#[must_use]
pub fn callbacks_completed_total() -> u64 {
    CALLBACKS_COMPLETED_TOTAL.load(Ordering::Relaxed)
}

/// Completed callbacks whose execution produced an error.
#[must_use]
pub fn callbacks_failed_total() -> u64 {
    CALLBACKS_FAILED_TOTAL.load(Ordering::Relaxed)
}

/// Results dropped because their callback had been superseded or cancelled.
#[must_use]
pub fn callbacks_discarded_total() -> u64 {
    CALLBACKS_DISCARDED_TOTAL.load(Ordering::Relaxed)
}

/// Callbacks dropped as circular or runaway.
#[must_use]
pub fn callbacks_circular_total() -> u64 {
    CALLBACKS_CIRCULAR_TOTAL.load(Ordering::Relaxed)
}

pub(crate) fn record_dispatched() {
    CALLBACKS_DISPATCHED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_completed(n: u64) {
    CALLBACKS_COMPLETED_TOTAL.fetch_add(n, Ordering::Relaxed);
}

pub(crate) fn record_failed() {
    CALLBACKS_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_discarded() {
    CALLBACKS_DISCARDED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_circular() {
    CALLBACKS_CIRCULAR_TOTAL.fetch_add(1, Ordering::Relaxed);
}
