//! Entity identity.
//!
//! An [`EntityKey`] names one normalized record. Two result objects of the same type with equal
//! identity-field values produce equal keys, whatever order their fields were built in.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::args::canonical_json;

/// Key of a record in the [`EntityStore`](super::EntityStore).
///
/// `Display` renders entities as `Typename:{"field":"value"}` and the root as `ROOT_QUERY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKey {
    /// The distinguished ROOT record every read starts from
    Root,
    /// A normalized entity
    Entity {
        /// Type discriminator of the entity
        typename: String,
        /// Canonical JSON of the identity fields (stable key ordering)
        identity: String,
    },
}

pub(crate) static ROOT_KEY: EntityKey = EntityKey::Root;

impl EntityKey {
    /// Display name of the ROOT record.
    pub const ROOT_ID: &'static str = "ROOT_QUERY";

    /// Build a key from a typename and `(field, value)` identity pairs.
    ///
    /// The pairs are serialized as a canonical JSON object, so their order does not matter.
    pub fn from_identity<'a, I>(typename: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let object: serde_json::Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        EntityKey::Entity {
            typename: typename.into(),
            identity: canonical_json(&Value::Object(object)),
        }
    }

    /// Returns true for the ROOT record.
    pub fn is_root(&self) -> bool {
        matches!(self, EntityKey::Root)
    }

    /// Typename of an entity key. ROOT has none, its policies live under the configured root typename.
    pub fn typename(&self) -> Option<&str> {
        match self {
            EntityKey::Root => None,
            EntityKey::Entity { typename, .. } => Some(typename),
        }
    }

    /// Canonical identity JSON of an entity key.
    pub fn identity(&self) -> Option<&str> {
        match self {
            EntityKey::Root => None,
            EntityKey::Entity { identity, .. } => Some(identity),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Root => f.write_str(Self::ROOT_ID),
            EntityKey::Entity { typename, identity } => write!(f, "{typename}:{identity}"),
        }
    }
}
