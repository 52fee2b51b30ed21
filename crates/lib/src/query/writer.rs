//! Result-tree normalization.
//!
//! The writer walks a result tree alongside its shape. Nested objects are written before their
//! parents, so the parent field can hold the child's reference. Objects of types with identity
//! become entity records; objects without identity stay inline in their parent's field; every
//! top-level field lands on ROOT. All records are staged first and only applied once the whole
//! tree normalized without error.

use serde_json::{Map, Value};

use super::{QueryError, SelectionSet};
use crate::{
    CacheConfig, Result,
    store::{
        EntityKey, EntityRecord, EntityStore, FieldKey, Fields, StagedChanges, StagedWrite,
        StoreValue,
    },
};

#[derive(Clone, Copy)]
enum Shape<'s> {
    /// Follow the selection
    Selected(&'s SelectionSet),
    /// Store the value as opaque JSON
    Leaf,
    /// Take every field of the payload, used for direct entity writes
    Any,
}

/// Stages the records of one result tree.
pub struct QueryResultWriter<'a> {
    staged: StagedWrite<'a>,
    config: &'a CacheConfig,
    variables: &'a Value,
}

impl<'a> QueryResultWriter<'a> {
    pub fn new(store: &'a EntityStore, config: &'a CacheConfig, variables: &'a Value) -> Self {
        Self {
            staged: store.stage(),
            config,
            variables,
        }
    }

    /// Normalize a query result whose top-level fields belong to ROOT.
    pub fn write_root(mut self, shape: &SelectionSet, result: &Value) -> Result<StagedChanges> {
        let object = expect_object(result, EntityKey::ROOT_ID)?;
        let fields = self.collect_fields(Shape::Selected(shape), object, "")?;
        self.staged.write_root(fields)?;
        Ok(self.staged.finish())
    }

    /// Normalize a single object of `typename` without a shape; every payload field is stored.
    pub fn write_entity(
        mut self,
        typename: &str,
        object: &Value,
    ) -> Result<(StoreValue, StagedChanges)> {
        let object = expect_object(object, typename)?;
        let fields = self.collect_fields(Shape::Any, object, typename)?;
        let value = self.staged.write(typename, fields)?;
        Ok((value, self.staged.finish()))
    }

    fn collect_fields(
        &mut self,
        shape: Shape<'_>,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<Fields> {
        let config = self.config;
        let typename_field = config.typename_field.as_str();
        let mut fields = Fields::new();
        match shape {
            Shape::Selected(selection) => {
                for field in selection.fields() {
                    if field.name() == typename_field {
                        continue;
                    }
                    let path = join(path, field.response_key());
                    let Some(value) = object.get(field.response_key()) else {
                        if !field.is_client() {
                            tracing::warn!(path = %path, "Missing field in result tree");
                        }
                        continue;
                    };
                    let (key, _) = field.store_key(self.variables);
                    let shape = field.selection().map_or(Shape::Leaf, Shape::Selected);
                    let value = self.normalize(shape, value, &path)?;
                    fields.insert(key, value);
                }
            }
            Shape::Any | Shape::Leaf => {
                for (name, value) in object {
                    if name == typename_field {
                        continue;
                    }
                    let value = self.normalize(Shape::Any, value, &join(path, name))?;
                    fields.insert(FieldKey::new(name.as_str()), value);
                }
            }
        }
        Ok(fields)
    }

    fn normalize(&mut self, shape: Shape<'_>, value: &Value, path: &str) -> Result<StoreValue> {
        match (shape, value) {
            (Shape::Leaf, value) => Ok(StoreValue::Json(value.clone())),
            (_, Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.normalize(shape, item, &join(path, &i.to_string())))
                .collect::<Result<Vec<_>>>()
                .map(StoreValue::List),
            (_, Value::Object(object)) => self.write_object(shape, object, path),
            (_, value) => Ok(StoreValue::Json(value.clone())),
        }
    }

    fn write_object(
        &mut self,
        shape: Shape<'_>,
        object: &Map<String, Value>,
        path: &str,
    ) -> Result<StoreValue> {
        let typename = object
            .get(&self.config.typename_field)
            .and_then(Value::as_str);
        let fields = self.collect_fields(shape, object, path)?;
        match typename {
            Some(typename) => self.staged.write(typename, fields),
            None if self.config.require_typename => Err(QueryError::MissingTypename {
                path: path.to_string(),
            }
            .into()),
            None => Ok(StoreValue::Inline(EntityRecord::with_fields(None, fields))),
        }
    }
}

fn expect_object<'v>(value: &'v Value, path: &str) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        QueryError::ExpectedObject {
            path: path.to_string(),
            actual: json_type(value).to_string(),
        }
        .into()
    })
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
