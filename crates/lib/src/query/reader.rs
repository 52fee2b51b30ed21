//! Result-tree reconstruction.
//!
//! The reader walks a shape from ROOT or from one entity, resolving each field through [`FieldResolver`] so read
//! policies apply at every level, and following references into the records they name. A field
//! that resolves to Missing does not stop the walk: the read continues and reports every
//! missing path in an [`ReadOutcome::Incomplete`].

use serde_json::{Map, Value};

use super::{SelectionSet, writer::join};
use crate::{
    CacheConfig, Result,
    policy::{Dependencies, FieldResolver, Owner},
    reactive::VarRegistry,
    store::{EntityKey, EntityStore, StoreValue, key::ROOT_KEY},
};

/// Result of reading a shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// Every requested field resolved
    Complete(Value),
    /// At least one requested field was missing; paths use `.` and list indices
    Incomplete { missing: Vec<String> },
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ReadOutcome::Complete(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ReadOutcome::Complete(data) => Some(data),
            ReadOutcome::Incomplete { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            ReadOutcome::Complete(data) => Some(data),
            ReadOutcome::Incomplete { .. } => None,
        }
    }

    /// Paths of missing fields, empty for a complete read.
    pub fn missing(&self) -> &[String] {
        match self {
            ReadOutcome::Complete(_) => &[],
            ReadOutcome::Incomplete { missing } => missing,
        }
    }
}

/// Reads one shape against a store snapshot.
pub struct QueryResultReader<'a> {
    resolver: FieldResolver<'a>,
    config: &'a CacheConfig,
    variables: &'a Value,
    missing: Vec<String>,
}

impl<'a> QueryResultReader<'a> {
    pub fn new(
        store: &'a EntityStore,
        vars: &'a VarRegistry,
        config: &'a CacheConfig,
        variables: &'a Value,
    ) -> Self {
        Self {
            resolver: FieldResolver::new(store, vars),
            config,
            variables,
            missing: Vec::new(),
        }
    }

    /// Read `shape` from ROOT, returning the outcome and everything the read touched.
    pub fn read(self, shape: &SelectionSet) -> Result<(ReadOutcome, Dependencies)> {
        self.read_from(&ROOT_KEY, shape)
    }

    /// Read `selection` from the record at `key`. Paths in the outcome are relative to it.
    pub fn read_from(
        mut self,
        key: &EntityKey,
        selection: &SelectionSet,
    ) -> Result<(ReadOutcome, Dependencies)> {
        self.resolver.record_entity(key);
        let owner = self.resolver.owner_for(key);
        let data = self.read_selection(owner, selection, "")?;
        let outcome = if self.missing.is_empty() {
            ReadOutcome::Complete(Value::Object(data))
        } else {
            tracing::debug!(missing = self.missing.len(), "Read is incomplete");
            ReadOutcome::Incomplete {
                missing: self.missing,
            }
        };
        Ok((outcome, self.resolver.into_dependencies()))
    }

    fn read_selection(
        &mut self,
        owner: Owner<'_>,
        selection: &SelectionSet,
        path: &str,
    ) -> Result<Map<String, Value>> {
        let config = self.config;
        let mut out = Map::new();
        for field in selection.fields() {
            let path = join(path, field.response_key());
            if field.name() == config.typename_field {
                // Omitted for inline records written without one.
                if let Some(typename) = owner.declared_typename() {
                    out.insert(
                        field.response_key().to_string(),
                        Value::String(typename.to_string()),
                    );
                }
                continue;
            }

            let (key, args) = field.store_key(self.variables);
            match self.resolver.resolve(owner, &key, args.as_ref())? {
                None => self.missing.push(path),
                Some(value) => {
                    let json = self.materialize(field.selection(), &value, &path)?;
                    out.insert(field.response_key().to_string(), json);
                }
            }
        }
        Ok(out)
    }

    fn materialize(
        &mut self,
        selection: Option<&SelectionSet>,
        value: &StoreValue,
        path: &str,
    ) -> Result<Value> {
        match value {
            StoreValue::Json(json) => Ok(match selection {
                Some(selection) => self.project_json(selection, json, path),
                None => json.clone(),
            }),
            StoreValue::Ref(key) => {
                let owner = self.resolver.owner_for(key);
                if owner.record().is_none() {
                    self.resolver.record_entity(key);
                    tracing::trace!(key = %key, path, "Reference to missing entity");
                    self.missing.push(path.to_string());
                    return Ok(Value::Null);
                }
                match selection {
                    Some(selection) => {
                        Ok(Value::Object(self.read_selection(owner, selection, path)?))
                    }
                    None => Ok(value.to_json()),
                }
            }
            StoreValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    if let StoreValue::Ref(key) = item {
                        let dangling = !self.resolver.store().contains(key);
                        if dangling && self.config.drop_dangling_list_refs {
                            self.resolver.record_entity(key);
                            tracing::trace!(key = %key, path, "Dropping dangling list reference");
                            continue;
                        }
                    }
                    out.push(self.materialize(selection, item, &join(path, &i.to_string()))?);
                }
                Ok(Value::Array(out))
            }
            StoreValue::Inline(record) => match selection {
                Some(selection) => {
                    let owner = self.resolver.inline_owner(record);
                    Ok(Value::Object(self.read_selection(owner, selection, path)?))
                }
                None => Ok(record.to_json()),
            },
        }
    }

    /// Apply a selection to opaque JSON, for values a read policy computed or that were stored
    /// without a shape.
    fn project_json(&mut self, selection: &SelectionSet, json: &Value, path: &str) -> Value {
        match json {
            Value::Object(object) => {
                let mut out = Map::new();
                for field in selection.fields() {
                    let path = join(path, field.response_key());
                    match object.get(field.name()) {
                        Some(value) => {
                            let value = match field.selection() {
                                Some(selection) => self.project_json(selection, value, &path),
                                None => value.clone(),
                            };
                            out.insert(field.response_key().to_string(), value);
                        }
                        None if field.name() == self.config.typename_field => {}
                        None => self.missing.push(path),
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.project_json(selection, item, &join(path, &i.to_string()))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
