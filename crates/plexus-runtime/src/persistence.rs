//! Persistence seam.
//!
//! An adapter sees every props write before it reaches the layout. User
//! writes go through [`PersistenceAdapter::apply_persistence`]; callback
//! outputs go through [`PersistenceAdapter::prune_persistence`] first, then
//! `apply_persistence`.

use plexus_core::ComponentId;
use serde_json::{Map, Value};

pub trait PersistenceAdapter {
    /// Substitute persisted values into `props`.
    fn apply_persistence(&mut self, id: &ComponentId, props: Map<String, Value>) -> Map<String, Value>;

    /// Drop persisted values invalidated by a callback write.
    fn prune_persistence(
        &mut self,
        id: &ComponentId,
        current: &Map<String, Value>,
        updated: Map<String, Value>,
    ) -> Map<String, Value>;
}

/// Pass-through adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl PersistenceAdapter for NoPersistence {
    fn apply_persistence(&mut self, _id: &ComponentId, props: Map<String, Value>) -> Map<String, Value> {
        props
    }

    fn prune_persistence(
        &mut self,
        _id: &ComponentId,
        _current: &Map<String, Value>,
        updated: Map<String, Value>,
    ) -> Map<String, Value> {
        updated
    }
}
