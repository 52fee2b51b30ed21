//! Field resolution.
//!
//! [`FieldResolver`] answers `(record, field, args)` requests: a registered read policy is
//! invoked with a [`ReadContext`], otherwise the stored value is returned. Every entity and
//! reactive variable touched along the way is recorded in [`Dependencies`], which is what lets
//! watches go stale when a variable changes even though no record did.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::PolicyError;
use crate::{
    Result,
    reactive::{VarError, VarRegistry, VarValue},
    store::{EntityKey, EntityRecord, EntityStore, FieldKey, StoreValue},
};

/// Read policies calling into each other deeper than this fail with `RecursionLimit`.
pub const MAX_POLICY_DEPTH: usize = 32;

/// Entities and variables a read touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    entities: BTreeSet<EntityKey>,
    vars: BTreeSet<String>,
}

impl Dependencies {
    pub fn entities(&self) -> &BTreeSet<EntityKey> {
        &self.entities
    }

    pub fn vars(&self) -> &BTreeSet<String> {
        &self.vars
    }

    /// Check whether any of `changed` was read.
    pub fn touches_any(&self, changed: &BTreeSet<EntityKey>) -> bool {
        if self.entities.len() <= changed.len() {
            self.entities.iter().any(|key| changed.contains(key))
        } else {
            changed.iter().any(|key| self.entities.contains(key))
        }
    }

    pub fn reads_var(&self, name: &str) -> bool {
        self.vars.contains(name)
    }
}

/// The record a field is being resolved on.
#[derive(Debug, Clone, Copy)]
pub struct Owner<'a> {
    key: Option<&'a EntityKey>,
    record: Option<&'a EntityRecord>,
    typename: &'a str,
}

impl<'a> Owner<'a> {
    pub fn key(&self) -> Option<&'a EntityKey> {
        self.key
    }

    pub fn record(&self) -> Option<&'a EntityRecord> {
        self.record
    }

    /// Typename used for policy lookups, empty for untyped inline records.
    pub fn typename(&self) -> &'a str {
        self.typename
    }

    /// The typename the record carries. `None` for inline records written without one.
    pub fn declared_typename(&self) -> Option<&'a str> {
        match self.key {
            Some(_) => Some(self.typename),
            None => self.record.and_then(|record| record.typename()),
        }
    }
}

/// Resolves fields through policies and records what was read.
///
/// One resolver serves one read call. It is not shared between threads.
pub struct FieldResolver<'a> {
    store: &'a EntityStore,
    vars: &'a VarRegistry,
    deps: RefCell<Dependencies>,
    depth: Cell<usize>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(store: &'a EntityStore, vars: &'a VarRegistry) -> Self {
        Self {
            store,
            vars,
            deps: RefCell::new(Dependencies::default()),
            depth: Cell::new(0),
        }
    }

    pub fn store(&self) -> &'a EntityStore {
        self.store
    }

    /// Owner for a keyed record. A deleted or never-written entity has no record.
    pub fn owner_for<'k>(&self, key: &'k EntityKey) -> Owner<'k>
    where
        'a: 'k,
    {
        Owner {
            key: Some(key),
            record: self.store.get(key),
            typename: self.store.typename_of(key),
        }
    }

    /// Owner for an inline record held in a parent field.
    pub fn inline_owner<'k>(&self, record: &'k EntityRecord) -> Owner<'k> {
        Owner {
            key: None,
            record: Some(record),
            typename: record.typename().unwrap_or_default(),
        }
    }

    /// Resolve `field` on `owner`. `None` is Missing, distinct from a stored `null`.
    pub fn resolve(
        &self,
        owner: Owner<'_>,
        field: &FieldKey,
        args: Option<&Value>,
    ) -> Result<Option<StoreValue>> {
        if let Some(key) = owner.key {
            self.record_entity(key);
        }
        let existing = owner.record.and_then(|record| record.get(field));
        let Some(read) = self.store.policies().read_fn(owner.typename, field.name()) else {
            return Ok(existing.cloned());
        };

        let depth = self.depth.get();
        if depth >= MAX_POLICY_DEPTH {
            return Err(PolicyError::RecursionLimit {
                typename: owner.typename.to_string(),
                field: field.name().to_string(),
                depth,
            }
            .into());
        }
        self.depth.set(depth + 1);
        let context = ReadContext {
            resolver: self,
            owner,
            field,
            args,
        };
        let result = read(existing, &context);
        self.depth.set(depth);
        result
    }

    pub fn record_entity(&self, key: &EntityKey) {
        let mut deps = self.deps.borrow_mut();
        if !deps.entities.contains(key) {
            deps.entities.insert(key.clone());
        }
    }

    pub fn record_var(&self, name: &str) {
        let mut deps = self.deps.borrow_mut();
        if !deps.vars.contains(name) {
            deps.vars.insert(name.to_string());
        }
    }

    pub fn into_dependencies(self) -> Dependencies {
        self.deps.into_inner()
    }
}

/// Helpers handed to a read policy.
///
/// Sibling lookups stay on the same record. Other entities are only reached through
/// [`read_ref_field`](Self::read_ref_field) with a key the policy holds.
pub struct ReadContext<'r> {
    resolver: &'r FieldResolver<'r>,
    owner: Owner<'r>,
    field: &'r FieldKey,
    args: Option<&'r Value>,
}

impl<'r> ReadContext<'r> {
    pub fn typename(&self) -> &str {
        self.owner.typename
    }

    /// Key of the record being read, `None` for inline records.
    pub fn key(&self) -> Option<&EntityKey> {
        self.owner.key
    }

    pub fn field(&self) -> &FieldKey {
        self.field
    }

    pub fn args(&self) -> Option<&Value> {
        self.args
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.and_then(|args| args.get(name))
    }

    /// Resolve an argument-free sibling field, applying its own read policy if any.
    pub fn read_field(&self, name: &str) -> Result<Option<StoreValue>> {
        self.resolver.resolve(self.owner, &FieldKey::new(name), None)
    }

    /// Resolve a sibling field and deserialize its JSON value.
    pub fn read_field_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.read_field(name)? {
            None => Ok(None),
            Some(StoreValue::Json(value)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.unexpected(name, std::any::type_name::<T>(), e.to_string())),
            Some(other) => Err(self.unexpected(
                name,
                std::any::type_name::<T>(),
                other.type_name().to_string(),
            )),
        }
    }

    /// Resolve a field of another entity the policy holds a reference to.
    pub fn read_ref_field(&self, key: &EntityKey, name: &str) -> Result<Option<StoreValue>> {
        let owner = self.resolver.owner_for(key);
        self.resolver.resolve(owner, &FieldKey::new(name), None)
    }

    /// Current value of a reactive variable. The field now depends on it.
    pub fn var<T: VarValue>(&self, name: &str) -> Result<T> {
        self.resolver.record_var(name);
        Ok(self.resolver.vars.get::<T>(name)?.get())
    }

    /// Current value of a reactive variable as JSON. The field now depends on it.
    pub fn var_json(&self, name: &str) -> Result<Value> {
        self.resolver.record_var(name);
        Ok(self.resolver.vars.snapshot(name)?)
    }

    /// Like [`var_json`](Self::var_json) but deserialized into `T`.
    pub fn var_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.var_json(name)?;
        serde_json::from_value(value).map_err(|e| {
            VarError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
                actual: e.to_string(),
            }
            .into()
        })
    }

    fn unexpected(&self, name: &str, expected: &str, actual: String) -> crate::Error {
        PolicyError::UnexpectedValue {
            typename: self.owner.typename.to_string(),
            field: name.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into()
    }
}
