//! Watches: registered reads that are re-delivered when their inputs change.
//!
//! Each watch remembers the last outcome it produced and the [`Dependencies`] of that read.
//! A store change touching one of the dependent entities re-reads the watch and calls back
//! only if the outcome differs. A change to a dependent variable always calls back: the
//! variable's version moved even when the computed outcome did not. Each such change is its own
//! delivery, outside a batch.
//!
//! A watch reads from ROOT or from one entity.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use serde_json::Value;

use crate::{
    policy::Dependencies,
    query::{QueryShape, ReadOutcome},
    reactive::SubscriberId,
    store::EntityKey,
};

/// Identifies a watch registered with [`Cache::watch`](crate::Cache::watch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub(crate) SubscriberId);

impl WatchId {
    pub(crate) fn subscriber(&self) -> SubscriberId {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch{}", self.0)
    }
}

pub(crate) type WatchCallback = Arc<dyn Fn(&ReadOutcome) + Send + Sync>;

pub(crate) struct Watch {
    /// Record the shape is read from
    pub(crate) root: Arc<EntityKey>,
    pub(crate) shape: Arc<QueryShape>,
    pub(crate) variables: Arc<Value>,
    pub(crate) callback: WatchCallback,
    pub(crate) last: ReadOutcome,
    pub(crate) deps: Dependencies,
    /// A variable it read changed since the last delivery. Survives a forced delivery merged
    /// into an earlier one by a batch.
    pub(crate) forced: bool,
}

/// Registered watches in registration order.
#[derive(Default)]
pub(crate) struct Watches {
    entries: BTreeMap<WatchId, Watch>,
}

impl Watches {
    pub(crate) fn insert(&mut self, id: WatchId, watch: Watch) {
        self.entries.insert(id, watch);
    }

    pub(crate) fn remove(&mut self, id: WatchId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn get_mut(&mut self, id: WatchId) -> Option<&mut Watch> {
        self.entries.get_mut(&id)
    }

    /// Watches depending on any of `changed`.
    pub(crate) fn touching(&self, changed: &BTreeSet<EntityKey>) -> Vec<WatchId> {
        self.entries
            .iter()
            .filter(|(_, watch)| watch.deps.touches_any(changed))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Watches that read variable `name`, marked for forced delivery.
    pub(crate) fn force_readers_of(&mut self, name: &str) -> Vec<WatchId> {
        self.entries
            .iter_mut()
            .filter(|(_, watch)| watch.deps.reads_var(name))
            .map(|(id, watch)| {
                watch.forced = true;
                *id
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
