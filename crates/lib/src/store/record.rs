//! Stored record contents.
//!
//! A record maps [`FieldKey`]s to [`StoreValue`]s. Values are scalars (any JSON leaf), references
//! to other entities, ordered lists of either, or inline records for types without identity.
//! A record never owns another entity's content, only its key.

use std::{collections::BTreeMap, fmt};

use serde_json::{Value, json};

use super::EntityKey;
use crate::query::args::{args_match, canonical_json};

/// Field storage type of a record.
pub type Fields = BTreeMap<FieldKey, StoreValue>;

/// Storage name of a field: the field name plus its canonical arguments.
///
/// Rendered as `name` when there are no arguments and `name({"arg":...})` otherwise, so the
/// same logical arguments built in a different order address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    name: String,
    args: Option<String>,
}

impl FieldKey {
    /// A field without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
        }
    }

    /// A field with arguments. `null` and `{}` count as no arguments.
    pub fn with_args(name: impl Into<String>, args: &Value) -> Self {
        let args = match args {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(canonical_json(other)),
        };
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical argument JSON, if any.
    pub fn args_json(&self) -> Option<&str> {
        self.args.as_deref()
    }

    /// Arguments parsed back into JSON, `None` without arguments.
    pub fn args_value(&self) -> Option<Value> {
        self.args
            .as_deref()
            .and_then(|args| serde_json::from_str(args).ok())
    }

    /// Check whether this key is `name` with arguments matching `filter`.
    ///
    /// A `None` filter matches every argument set. Otherwise every entry of the filter must
    /// be present, recursively, in the stored arguments.
    pub fn matches(&self, name: &str, filter: Option<&Value>) -> bool {
        if self.name != name {
            return false;
        }
        match filter {
            None => true,
            Some(filter) => {
                let stored = self.args_value().unwrap_or(Value::Object(Default::default()));
                args_match(&stored, filter)
            }
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            None => f.write_str(&self.name),
            Some(args) => write!(f, "{}({args})", self.name),
        }
    }
}

/// A value held in a record field.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    /// Scalar or opaque JSON value, including `null`
    Json(Value),
    /// Reference to a normalized entity
    Ref(EntityKey),
    /// Ordered sequence; order is significant and never part of identity
    List(Vec<StoreValue>),
    /// Record of a type without identity, stored inside its parent's slot
    Inline(EntityRecord),
}

impl StoreValue {
    pub fn null() -> Self {
        StoreValue::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Json(Value::Null))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            StoreValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_ref_key(&self) -> Option<&EntityKey> {
        match self {
            StoreValue::Ref(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StoreValue]> {
        match self {
            StoreValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_inline(&self) -> Option<&EntityRecord> {
        match self {
            StoreValue::Inline(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreValue::Json(_) => "json",
            StoreValue::Ref(_) => "ref",
            StoreValue::List(_) => "list",
            StoreValue::Inline(_) => "inline",
        }
    }

    /// Call `visit` for every entity reference held by this value, including nested ones.
    pub fn visit_refs<'a>(&'a self, visit: &mut impl FnMut(&'a EntityKey)) {
        match self {
            StoreValue::Json(_) => {}
            StoreValue::Ref(key) => visit(key),
            StoreValue::List(items) => items.iter().for_each(|item| item.visit_refs(visit)),
            StoreValue::Inline(record) => record.visit_refs(visit),
        }
    }

    /// Diagnostic JSON. References render as `{"__ref": "<key>"}`.
    pub fn to_json(&self) -> Value {
        match self {
            StoreValue::Json(value) => value.clone(),
            StoreValue::Ref(key) => json!({ "__ref": key.to_string() }),
            StoreValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            StoreValue::Inline(record) => record.to_json(),
        }
    }
}

impl From<Value> for StoreValue {
    fn from(value: Value) -> Self {
        StoreValue::Json(value)
    }
}

impl From<EntityKey> for StoreValue {
    fn from(key: EntityKey) -> Self {
        StoreValue::Ref(key)
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::Json(Value::String(s.to_string()))
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::Json(Value::String(s))
    }
}

impl From<bool> for StoreValue {
    fn from(b: bool) -> Self {
        StoreValue::Json(Value::Bool(b))
    }
}

impl From<i64> for StoreValue {
    fn from(n: i64) -> Self {
        StoreValue::Json(Value::from(n))
    }
}

impl From<Vec<StoreValue>> for StoreValue {
    fn from(items: Vec<StoreValue>) -> Self {
        StoreValue::List(items)
    }
}

/// A stored record: an optional typename plus its fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityRecord {
    typename: Option<String>,
    fields: Fields,
}

impl EntityRecord {
    pub fn new(typename: impl Into<String>) -> Self {
        Self {
            typename: Some(typename.into()),
            fields: Fields::new(),
        }
    }

    /// A record without a type discriminator.
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn with_fields(typename: Option<String>, fields: Fields) -> Self {
        Self { typename, fields }
    }

    pub fn typename(&self) -> Option<&str> {
        self.typename.as_deref()
    }

    pub fn get(&self, field: &FieldKey) -> Option<&StoreValue> {
        self.fields.get(field)
    }

    /// Value of an argument-free field.
    pub fn get_field(&self, name: &str) -> Option<&StoreValue> {
        self.fields.get(&FieldKey::new(name))
    }

    pub fn insert(&mut self, field: FieldKey, value: StoreValue) -> Option<StoreValue> {
        self.fields.insert(field, value)
    }

    pub fn remove(&mut self, field: &FieldKey) -> Option<StoreValue> {
        self.fields.remove(field)
    }

    /// Remove every field named `name` whose arguments match `filter`. Returns the count removed.
    pub fn remove_matching(&mut self, name: &str, filter: Option<&Value>) -> usize {
        let before = self.fields.len();
        self.fields.retain(|key, _| !key.matches(name, filter));
        before - self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldKey, &StoreValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Call `visit` for every entity reference held in any field.
    pub fn visit_refs<'a>(&'a self, visit: &mut impl FnMut(&'a EntityKey)) {
        self.fields.values().for_each(|value| value.visit_refs(visit));
    }

    /// Diagnostic JSON of the record, keyed by rendered field keys.
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        if let Some(typename) = &self.typename {
            object.insert("__typename".to_string(), Value::String(typename.clone()));
        }
        for (key, value) in &self.fields {
            object.insert(key.to_string(), value.to_json());
        }
        Value::Object(object)
    }
}
