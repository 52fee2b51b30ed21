//! Query shapes.
//!
//! A [`SelectionSet`] describes which fields of a result tree are read or written, with the
//! arguments and nested selections of each. Shapes are plain data built in code; there is no
//! query-language parser.
//!
//! ```
//! use normcache::{ArgValue, FieldSelection, SelectionSet};
//! use serde_json::json;
//!
//! let shape = SelectionSet::new().field(
//!     FieldSelection::new("countries")
//!         .arg("filter", ArgValue::var("arg"))
//!         .select(
//!             SelectionSet::new()
//!                 .scalars(["code", "name", "capital", "emoji"])
//!                 .field(FieldSelection::new("selected").client()),
//!         ),
//! );
//!
//! let field = &shape.fields()[0];
//! let (key, _) = field.store_key(&json!({"arg": {"code": {"regex": "U"}}}));
//! assert_eq!(key.to_string(), r#"countries({"filter":{"code":{"regex":"U"}}})"#);
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::store::FieldKey;

/// An argument value: a literal, a reference to a query variable, or a structure of either.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Value),
    Variable(String),
    Object(BTreeMap<String, ArgValue>),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Reference to the query variable `name`.
    pub fn var(name: impl Into<String>) -> Self {
        ArgValue::Variable(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ArgValue::Literal(value.into())
    }

    /// Substitute query variables.
    ///
    /// An unbound variable resolves to `None` and the argument is omitted. Inside a list it
    /// becomes `null` so positions are kept.
    pub fn resolve(&self, variables: &Value) -> Option<Value> {
        match self {
            ArgValue::Literal(value) => Some(value.clone()),
            ArgValue::Variable(name) => variables.get(name).cloned(),
            ArgValue::Object(entries) => Some(Value::Object(
                entries
                    .iter()
                    .filter_map(|(key, value)| {
                        value.resolve(variables).map(|value| (key.clone(), value))
                    })
                    .collect(),
            )),
            ArgValue::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Literal(value)
    }
}

/// One selected field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    name: String,
    alias: Option<String>,
    args: BTreeMap<String, ArgValue>,
    selection: Option<SelectionSet>,
    client: bool,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            args: BTreeMap::new(),
            selection: None,
            client: false,
        }
    }

    /// Name the field under `alias` in result trees. Storage still uses the field name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Nested selection for object-valued fields.
    pub fn select(mut self, selection: SelectionSet) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Mark the field as computed locally. It is never expected in server payloads.
    pub fn client(mut self) -> Self {
        self.client = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the field in result trees: the alias if set, the name otherwise.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn selection(&self) -> Option<&SelectionSet> {
        self.selection.as_ref()
    }

    pub fn is_client(&self) -> bool {
        self.client
    }

    /// Arguments with variables substituted, `None` when no argument survives.
    pub fn resolve_args(&self, variables: &Value) -> Option<Value> {
        let resolved: Map<String, Value> = self
            .args
            .iter()
            .filter_map(|(name, value)| value.resolve(variables).map(|value| (name.clone(), value)))
            .collect();
        (!resolved.is_empty()).then_some(Value::Object(resolved))
    }

    /// Storage key of the field under `variables`, with the resolved arguments.
    pub fn store_key(&self, variables: &Value) -> (FieldKey, Option<Value>) {
        match self.resolve_args(variables) {
            Some(args) => (FieldKey::with_args(self.name.as_str(), &args), Some(args)),
            None => (FieldKey::new(self.name.as_str()), None),
        }
    }
}

/// An ordered set of field selections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    fields: Vec<FieldSelection>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSelection) -> Self {
        self.fields.push(field);
        self
    }

    /// Select a leaf field without arguments.
    pub fn scalar(self, name: impl Into<String>) -> Self {
        self.field(FieldSelection::new(name))
    }

    pub fn scalars<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |set, name| set.scalar(name))
    }

    pub fn fields(&self) -> &[FieldSelection] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
