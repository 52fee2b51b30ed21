//! Per-type field policies.
//!
//! Policies are registered once, when the [`Cache`](crate::Cache) is built, and are immutable
//! afterwards. Each `(typename, field)` pair may carry a `read` function, a `merge` function,
//! or both:
//!
//! - **read** computes the value returned for a field. It sees the stored value (if any) and a
//!   [`ReadContext`] that can look up sibling fields, dereference a stored reference, and read
//!   reactive variables. Reading a variable makes the field depend on it.
//! - **merge** decides what is stored when new data for a field arrives. Its return value is
//!   stored verbatim, so it can take the incoming value, union lists, or keep the existing value.
//!
//! Without a read policy a field resolves to its stored value; without a merge policy the
//! incoming value replaces the existing one.
//!
//! ```
//! use normcache::{StoreValue, policy::{FieldPolicy, TypePolicies, TypePolicy, merge}};
//!
//! let policies = TypePolicies::new()
//!     .add_type(
//!         "Country",
//!         TypePolicy::new()
//!             .key_fields(["code"])
//!             .read("nameWithEmoji", |_, ctx| {
//!                 let name = ctx.read_field_as::<String>("name")?.unwrap_or_default();
//!                 let emoji = ctx.read_field_as::<String>("emoji")?.unwrap_or_default();
//!                 Ok(Some(StoreValue::from(format!("{name} {emoji}"))))
//!             }),
//!     )
//!     .add_type("Query", TypePolicy::new().field("countries", FieldPolicy::merging(merge::prefer_incoming())));
//!
//! assert!(policies.read_fn("Country", "nameWithEmoji").is_some());
//! assert!(policies.merge_fn("Query", "countries").is_some());
//! assert_eq!(policies.key_fields("Country"), Some(&["code".to_string()][..]));
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    Result,
    store::{FieldKey, StoreValue},
};

mod context;
pub mod errors;
pub mod merge;

pub use context::{Dependencies, FieldResolver, Owner, ReadContext};
pub use errors::PolicyError;

/// A read policy: `(stored value, helpers) -> value`, where `None` means Missing.
pub type ReadFn =
    Arc<dyn Fn(Option<&StoreValue>, &ReadContext<'_>) -> Result<Option<StoreValue>> + Send + Sync>;

/// A merge policy: `(existing, incoming, context) -> stored`.
pub type MergeFn =
    Arc<dyn Fn(Option<&StoreValue>, StoreValue, &MergeContext<'_>) -> Result<StoreValue> + Send + Sync>;

/// Where a merge policy is being applied.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    /// Typename of the record receiving the write
    pub typename: &'a str,
    /// Storage key of the field, including its arguments
    pub field: &'a FieldKey,
}

/// The policy of one field: a read function, a merge function, or both.
#[derive(Clone, Default)]
pub struct FieldPolicy {
    read: Option<ReadFn>,
    merge: Option<MergeFn>,
}

impl FieldPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with only a read function.
    pub fn reading<F>(read: F) -> Self
    where
        F: Fn(Option<&StoreValue>, &ReadContext<'_>) -> Result<Option<StoreValue>>
            + Send
            + Sync
            + 'static,
    {
        Self::new().with_read(read)
    }

    /// A policy with only a merge function.
    pub fn merging(merge: MergeFn) -> Self {
        Self {
            read: None,
            merge: Some(merge),
        }
    }

    pub fn with_read<F>(mut self, read: F) -> Self
    where
        F: Fn(Option<&StoreValue>, &ReadContext<'_>) -> Result<Option<StoreValue>>
            + Send
            + Sync
            + 'static,
    {
        self.read = Some(Arc::new(read));
        self
    }

    pub fn with_merge<F>(mut self, merge: F) -> Self
    where
        F: Fn(Option<&StoreValue>, StoreValue, &MergeContext<'_>) -> Result<StoreValue>
            + Send
            + Sync
            + 'static,
    {
        self.merge = Some(Arc::new(merge));
        self
    }

    pub fn read_fn(&self) -> Option<&ReadFn> {
        self.read.as_ref()
    }

    pub fn merge_fn(&self) -> Option<&MergeFn> {
        self.merge.as_ref()
    }
}

impl fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPolicy")
            .field("read", &self.read.is_some())
            .field("merge", &self.merge.is_some())
            .finish()
    }
}

/// Identity and field policies for one type.
#[derive(Debug, Clone, Default)]
pub struct TypePolicy {
    key_fields: Option<Vec<String>>,
    fields: HashMap<String, FieldPolicy>,
}

impl TypePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields whose values identify an entity of this type.
    ///
    /// Types without key fields are stored inline in their parent.
    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Register the full policy of a field, replacing any earlier one.
    pub fn field(mut self, name: impl Into<String>, policy: FieldPolicy) -> Self {
        self.fields.insert(name.into(), policy);
        self
    }

    /// Register a read function, keeping any merge function already registered for the field.
    pub fn read<F>(mut self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn(Option<&StoreValue>, &ReadContext<'_>) -> Result<Option<StoreValue>>
            + Send
            + Sync
            + 'static,
    {
        let entry = self.fields.entry(name.into()).or_default();
        entry.read = Some(Arc::new(read));
        self
    }

    /// Register a merge function, keeping any read function already registered for the field.
    pub fn merge(mut self, name: impl Into<String>, merge: MergeFn) -> Self {
        let entry = self.fields.entry(name.into()).or_default();
        entry.merge = Some(merge);
        self
    }
}

/// Registry of policies keyed by `(typename, field)`.
#[derive(Debug, Clone, Default)]
pub struct TypePolicies {
    key_fields: HashMap<String, Vec<String>>,
    fields: HashMap<String, HashMap<String, FieldPolicy>>,
}

impl TypePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the policy of `typename`. Adding a type twice replaces its earlier policy.
    pub fn add_type(mut self, typename: impl Into<String>, policy: TypePolicy) -> Self {
        let typename = typename.into();
        match policy.key_fields {
            Some(key_fields) => {
                self.key_fields.insert(typename.clone(), key_fields);
            }
            None => {
                self.key_fields.remove(&typename);
            }
        }
        self.fields.insert(typename, policy.fields);
        self
    }

    /// Identity fields of `typename`, `None` for inline-only types.
    pub fn key_fields(&self, typename: &str) -> Option<&[String]> {
        self.key_fields.get(typename).map(Vec::as_slice)
    }

    pub fn has_identity(&self, typename: &str) -> bool {
        self.key_fields.contains_key(typename)
    }

    pub fn field_policy(&self, typename: &str, field: &str) -> Option<&FieldPolicy> {
        self.fields.get(typename).and_then(|fields| fields.get(field))
    }

    pub fn read_fn(&self, typename: &str, field: &str) -> Option<&ReadFn> {
        self.field_policy(typename, field).and_then(FieldPolicy::read_fn)
    }

    pub fn merge_fn(&self, typename: &str, field: &str) -> Option<&MergeFn> {
        self.field_policy(typename, field).and_then(FieldPolicy::merge_fn)
    }
}
