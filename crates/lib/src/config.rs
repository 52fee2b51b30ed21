//! Cache configuration.
//!
//! [`CacheConfig`] carries the settings that are not tied to a particular type. Type policies
//! are supplied separately through [`TypePolicies`](crate::policy::TypePolicies).
//!
//! # Example
//!
//! ```
//! use normcache::CacheConfig;
//!
//! let config = CacheConfig::default().with_broadcast_by_default(false);
//! assert_eq!(config.root_typename, "Query");
//! assert!(!config.broadcast_by_default);
//!
//! let parsed = CacheConfig::from_json_str(r#"{"typename_field": "kind"}"#).unwrap();
//! assert_eq!(parsed.typename_field, "kind");
//! assert_eq!(parsed.root_typename, "Query");
//! ```

use serde::{Deserialize, Serialize};

use crate::Result;

/// Settings shared by every component of a [`Cache`](crate::Cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Typename under which ROOT field policies are registered
    pub root_typename: String,
    /// Payload field carrying an object's type discriminator
    pub typename_field: String,
    /// Whether evictions notify watches when the caller does not say
    pub broadcast_by_default: bool,
    /// Drop list elements that reference deleted entities instead of failing the read
    pub drop_dangling_list_refs: bool,
    /// Reject result objects with a selection but no type discriminator
    pub require_typename: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_typename: "Query".to_string(),
            typename_field: "__typename".to_string(),
            broadcast_by_default: true,
            drop_dangling_list_refs: true,
            require_typename: false,
        }
    }
}

impl CacheConfig {
    /// Parse a configuration from JSON. Missing keys take their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_root_typename(mut self, typename: impl Into<String>) -> Self {
        self.root_typename = typename.into();
        self
    }

    pub fn with_typename_field(mut self, field: impl Into<String>) -> Self {
        self.typename_field = field.into();
        self
    }

    pub fn with_broadcast_by_default(mut self, broadcast: bool) -> Self {
        self.broadcast_by_default = broadcast;
        self
    }

    pub fn with_drop_dangling_list_refs(mut self, drop: bool) -> Self {
        self.drop_dangling_list_refs = drop;
        self
    }

    pub fn with_require_typename(mut self, require: bool) -> Self {
        self.require_typename = require;
        self
    }
}
