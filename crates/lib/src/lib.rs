//!
//! Normcache: a normalized entity cache with computed fields and reactive selection state.
//! This library provides the in-memory store that backs client-side forms and tables.
//!
//! ## Core Concepts
//!
//! * **Entities (`store::EntityRecord`)**: Typed records stored once per [`EntityKey`], derived from
//!   the per-type identity fields. Records only ever hold references to other entities, so the store
//!   is a directed graph keyed by `EntityKey` rather than a value tree.
//! * **ROOT (`EntityKey::Root`)**: The pseudo-entity whose fields are keyed by field name plus
//!   deterministically serialized arguments. Every read begins here.
//! * **Field policies (`policy::TypePolicies`)**: Per-type `read` functions (computed and virtual
//!   fields) and `merge` functions (how incoming data combines with existing data).
//! * **Reactive variables (`reactive::ReactiveVar`)**: Named, externally settable cells. Field
//!   policies read them and watches depending on them are re-delivered when they change.
//! * **Writer/Reader (`query`)**: Normalizes result trees into records, and rebuilds result trees from
//!   records plus policies, reporting `Incomplete` when a requested field is missing.
//! * **Eviction and GC (`cache::EvictTarget`, `Cache::gc`)**: Targeted removal of entities or ROOT
//!   fields and a sweep of everything no longer reachable from ROOT.
//!
//! Everything is reached through a [`Cache`], an explicit context object. Tests create one per case.
//!
//! ```
//! use normcache::{Cache, CacheConfig, policy::{TypePolicies, TypePolicy}};
//!
//! let policies = TypePolicies::new().add_type("Country", TypePolicy::new().key_fields(["code"]));
//! let cache = Cache::new(CacheConfig::default(), policies);
//! let key = cache
//!     .write_entity("Country", &serde_json::json!({"code": "FR", "name": "France"}))
//!     .unwrap();
//! assert_eq!(key.to_string(), r#"Country:{"code":"FR"}"#);
//! ```

pub mod cache;
pub mod config;
mod locks;
pub mod policy;
pub mod query;
pub mod reactive;
pub mod store;

pub use cache::{Cache, EvictOptions, EvictTarget, WatchId};
pub use config::CacheConfig;
pub use query::{ArgValue, FieldSelection, QueryShape, ReadOutcome, SelectionSet};
pub use reactive::ReactiveVar;
pub use store::{EntityKey, EntityRecord, FieldKey, StoreValue};

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured entity store errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Failures raised by read or merge policies
    #[error(transparent)]
    Policy(policy::PolicyError),

    /// Structured reactive variable errors from the reactive module
    #[error(transparent)]
    Reactive(reactive::VarError),

    /// Structured query shape / result tree errors from the query module
    #[error(transparent)]
    Query(query::QueryError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Policy(_) => "policy",
            Error::Reactive(_) => "reactive",
            Error::Query(_) => "query",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a write was missing a configured identity field.
    pub fn is_identity_missing(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_identity_missing(),
            _ => false,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Reactive(var_err) => var_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error came out of a field policy.
    pub fn is_policy_error(&self) -> bool {
        matches!(self, Error::Policy(_))
    }

    /// Check if this error is type-related.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Reactive(var_err) => var_err.is_type_error(),
            Error::Policy(policy_err) => policy_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error is reactive-variable related.
    pub fn is_reactive_error(&self) -> bool {
        matches!(self, Error::Reactive(_))
    }

    /// Check if this error is about the shape of a query or result tree.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Error::Query(_))
    }
}
