//! Eviction targets and reachability.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use crate::store::{EntityKey, EntityStore, key::ROOT_KEY};

/// What [`Cache::evict`](crate::Cache::evict) removes.
#[derive(Debug, Clone, PartialEq)]
pub enum EvictTarget {
    /// A whole record. References to it are left dangling.
    Entity(EntityKey),
    /// Fields of one record named `field` whose arguments match `args`; `None` matches any.
    EntityField {
        key: EntityKey,
        field: String,
        args: Option<Value>,
    },
    /// ROOT fields named `field` whose arguments match `args`; `None` matches any.
    RootField { field: String, args: Option<Value> },
}

impl EvictTarget {
    /// Every `field` entry on ROOT, whatever its arguments.
    pub fn root_field(field: impl Into<String>) -> Self {
        EvictTarget::RootField {
            field: field.into(),
            args: None,
        }
    }

    /// ROOT `field` entries whose arguments contain `args`.
    pub fn root_field_matching(field: impl Into<String>, args: Value) -> Self {
        EvictTarget::RootField {
            field: field.into(),
            args: Some(args),
        }
    }

    pub fn entity_field(key: EntityKey, field: impl Into<String>) -> Self {
        EvictTarget::EntityField {
            key,
            field: field.into(),
            args: None,
        }
    }

    /// The record whose contents the eviction changes.
    pub(crate) fn owner(&self) -> &EntityKey {
        match self {
            EvictTarget::Entity(key) | EvictTarget::EntityField { key, .. } => key,
            EvictTarget::RootField { .. } => &ROOT_KEY,
        }
    }

    pub(crate) fn apply(&self, store: &mut EntityStore) -> usize {
        match self {
            EvictTarget::Entity(key) => usize::from(store.delete(key)),
            EvictTarget::EntityField { key, field, args } => {
                store.delete_field(key, field, args.as_ref())
            }
            EvictTarget::RootField { field, args } => store.delete_root_field(field, args.as_ref()),
        }
    }
}

impl From<EntityKey> for EvictTarget {
    fn from(key: EntityKey) -> Self {
        EvictTarget::Entity(key)
    }
}

/// Options of one eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictOptions {
    /// Notify affected watches. `None` uses `CacheConfig::broadcast_by_default`.
    pub broadcast: Option<bool>,
}

impl EvictOptions {
    /// Evict without notifying watches.
    pub fn silent() -> Self {
        Self {
            broadcast: Some(false),
        }
    }

    pub fn broadcast() -> Self {
        Self {
            broadcast: Some(true),
        }
    }
}

/// Keys reachable from `roots` by following references, each visited once.
pub(crate) fn reachable(
    store: &EntityStore,
    roots: impl IntoIterator<Item = EntityKey>,
) -> HashSet<EntityKey> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<EntityKey> = roots.into_iter().collect();
    while let Some(key) = queue.pop_front() {
        if !seen.insert(key.clone()) {
            continue;
        }
        if let Some(record) = store.get(&key) {
            record.visit_refs(&mut |next| {
                if !seen.contains(next) {
                    queue.push_back(next.clone());
                }
            });
        }
    }
    seen
}
