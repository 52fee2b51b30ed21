//! Normalized entity storage.
//!
//! The [`EntityStore`] is an arena keyed by [`EntityKey`]. Writes compute identity from the
//! type's configured identity fields and combine each field through the type's merge policy
//! (last write wins when none is registered). Types without an identity policy are never given
//! a key: writing them yields an inline record for the parent to hold.
//!
//! Multi-record writes go through a [`StagedWrite`], which computes identities and merges
//! against a private overlay. Nothing is visible in the store until [`EntityStore::apply`], so a
//! failed write leaves the store untouched.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, hash_map::Entry},
    sync::Arc,
};

use serde_json::Value;

use crate::{
    Result,
    policy::{MergeContext, TypePolicies},
};

pub mod errors;
pub mod key;
pub mod record;

pub use errors::StoreError;
pub use key::EntityKey;
pub use record::{EntityRecord, FieldKey, Fields, StoreValue};

/// Record changes produced by a [`StagedWrite`], waiting to be applied.
#[derive(Debug, Default)]
pub struct StagedChanges {
    records: HashMap<EntityKey, EntityRecord>,
}

impl StagedChanges {
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Keyed storage of normalized records.
#[derive(Debug)]
pub struct EntityStore {
    policies: Arc<TypePolicies>,
    root_typename: String,
    records: HashMap<EntityKey, EntityRecord>,
}

impl EntityStore {
    /// Creates an empty store governed by `policies`.
    ///
    /// `root_typename` is the typename under which ROOT field policies are looked up.
    pub fn new(policies: Arc<TypePolicies>, root_typename: impl Into<String>) -> Self {
        Self {
            policies,
            root_typename: root_typename.into(),
            records: HashMap::new(),
        }
    }

    pub fn policies(&self) -> &TypePolicies {
        &self.policies
    }

    pub fn root_typename(&self) -> &str {
        &self.root_typename
    }

    /// Typename used for policy lookups on `key`.
    pub fn typename_of<'a>(&'a self, key: &'a EntityKey) -> &'a str {
        key.typename().unwrap_or(&self.root_typename)
    }

    /// Compute the key for an object of `typename` with `fields`.
    ///
    /// Returns `Ok(None)` for types without an identity policy. The root typename always maps
    /// to [`EntityKey::Root`].
    pub fn identify(&self, typename: &str, fields: &Fields) -> Result<Option<EntityKey>> {
        if typename == self.root_typename {
            return Ok(Some(EntityKey::Root));
        }
        let Some(key_fields) = self.policies.key_fields(typename) else {
            return Ok(None);
        };

        let mut identity = Vec::with_capacity(key_fields.len());
        for field in key_fields {
            match fields.get(&FieldKey::new(field.as_str())) {
                None | Some(StoreValue::Json(Value::Null)) => {
                    return Err(StoreError::IdentityMissing {
                        typename: typename.to_string(),
                        field: field.clone(),
                    }
                    .into());
                }
                Some(StoreValue::Json(value)) => identity.push((field.as_str(), value)),
                Some(other) => {
                    return Err(StoreError::InvalidIdentity {
                        typename: typename.to_string(),
                        field: field.clone(),
                        reason: format!("identity fields must be scalars, found {}", other.type_name()),
                    }
                    .into());
                }
            }
        }
        Ok(Some(EntityKey::from_identity(typename, identity)))
    }

    /// Write one record and apply it immediately.
    ///
    /// Returns a [`StoreValue::Ref`] for identified types and a [`StoreValue::Inline`] record,
    /// which the caller must place in a parent field, for types without identity.
    pub fn write(&mut self, typename: &str, fields: Fields) -> Result<StoreValue> {
        let (value, changes) = {
            let mut staged = self.stage();
            let value = staged.write(typename, fields)?;
            (value, staged.finish())
        };
        self.apply(changes);
        Ok(value)
    }

    /// Start a staged write against the current contents.
    pub fn stage(&self) -> StagedWrite<'_> {
        StagedWrite {
            store: self,
            changes: StagedChanges::default(),
        }
    }

    /// Apply staged changes, returning the keys whose records actually changed.
    pub fn apply(&mut self, changes: StagedChanges) -> BTreeSet<EntityKey> {
        let mut dirty = BTreeSet::new();
        for (key, record) in changes.records {
            if self.records.get(&key) != Some(&record) {
                tracing::trace!(key = %key, fields = record.len(), "Storing record");
                self.records.insert(key.clone(), record);
                dirty.insert(key);
            }
        }
        dirty
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.records.contains_key(key)
    }

    /// Stored value of one field, `None` (Missing) if it was never written or the record is gone.
    ///
    /// Returns a copy; stored records are only changed through the store's own entry points.
    pub fn read(&self, key: &EntityKey, field: &FieldKey) -> Option<StoreValue> {
        self.records.get(key).and_then(|record| record.get(field)).cloned()
    }

    /// Remove a record outright. References to it elsewhere are left dangling.
    pub fn delete(&mut self, key: &EntityKey) -> bool {
        let removed = self.records.remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "Deleted record");
        }
        removed
    }

    /// Remove fields named `name` with arguments matching `filter` from one record.
    pub fn delete_field(&mut self, key: &EntityKey, name: &str, filter: Option<&Value>) -> usize {
        let count = self
            .records
            .get_mut(key)
            .map_or(0, |record| record.remove_matching(name, filter));
        if count > 0 {
            tracing::debug!(key = %key, field = name, count, "Deleted fields");
        }
        count
    }

    /// Remove matching ROOT fields so the query is treated as unfetched.
    pub fn delete_root_field(&mut self, name: &str, filter: Option<&Value>) -> usize {
        self.delete_field(&EntityKey::Root, name, filter)
    }

    /// Remove every record for which `keep` returns false, returning the removed keys.
    pub(crate) fn remove_unless(&mut self, keep: impl Fn(&EntityKey) -> bool) -> Vec<EntityKey> {
        let doomed: Vec<EntityKey> = self.records.keys().filter(|key| !keep(key)).cloned().collect();
        for key in &doomed {
            self.records.remove(key);
        }
        doomed
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Diagnostic snapshot of every record, keyed by rendered entity key.
    pub fn to_json(&self) -> Value {
        let sorted: BTreeMap<String, Value> = self
            .records
            .iter()
            .map(|(key, record)| (key.to_string(), record.to_json()))
            .collect();
        Value::Object(sorted.into_iter().collect())
    }
}

/// A write in progress: records are merged into an overlay over the store.
pub struct StagedWrite<'a> {
    store: &'a EntityStore,
    changes: StagedChanges,
}

impl StagedWrite<'_> {
    /// Stage a record of `typename`, merging into any existing entity with the same key.
    pub fn write(&mut self, typename: &str, fields: Fields) -> Result<StoreValue> {
        match self.store.identify(typename, &fields)? {
            Some(key) => {
                self.merge_into(&key, typename, fields)?;
                Ok(StoreValue::Ref(key))
            }
            None => Ok(StoreValue::Inline(EntityRecord::with_fields(
                Some(typename.to_string()),
                fields,
            ))),
        }
    }

    /// Stage fields onto the ROOT record.
    pub fn write_root(&mut self, fields: Fields) -> Result<()> {
        let typename = self.store.root_typename.clone();
        self.merge_into(&EntityKey::Root, &typename, fields)
    }

    fn merge_into(&mut self, key: &EntityKey, typename: &str, incoming: Fields) -> Result<()> {
        let store = self.store;
        let record = match self.changes.records.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                store
                    .records
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| EntityRecord::new(typename)),
            ),
        };

        for (field, value) in incoming {
            let merged = match store.policies.merge_fn(typename, field.name()) {
                Some(merge) => {
                    let context = MergeContext {
                        typename,
                        field: &field,
                    };
                    tracing::trace!(key = %key, field = %field, "Applying merge policy");
                    merge(record.get(&field), value, &context)?
                }
                None => value,
            };
            record.insert(field, merged);
        }
        Ok(())
    }

    /// Finish staging. Pass the result to [`EntityStore::apply`].
    pub fn finish(self) -> StagedChanges {
        self.changes
    }
}
