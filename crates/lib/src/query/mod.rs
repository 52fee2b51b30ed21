//! Query shapes and the result-tree writer and reader.
//!
//! A [`QueryShape`] names the fields a query selects. [`write_result`] normalizes a result tree
//! of that shape into store records; [`read_result`] rebuilds the tree, applying read policies,
//! and reports which entities and variables the read depended on.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::{
    CacheConfig, Result,
    policy::Dependencies,
    reactive::VarRegistry,
    store::{EntityKey, EntityStore},
};

pub mod args;
pub mod errors;
pub mod reader;
pub mod shape;
pub mod writer;

pub use errors::QueryError;
pub use reader::{QueryResultReader, ReadOutcome};
pub use shape::{ArgValue, FieldSelection, SelectionSet};
pub use writer::QueryResultWriter;

/// The shape of a query: its top-level selection, all of which lives on ROOT.
pub type QueryShape = SelectionSet;

/// Normalize `result` into `store`, returning the keys of records that changed.
///
/// Nothing is written if any part of the tree fails to normalize.
pub fn write_result(
    store: &mut EntityStore,
    config: &CacheConfig,
    shape: &QueryShape,
    variables: &Value,
    result: &Value,
) -> Result<BTreeSet<EntityKey>> {
    let changes = QueryResultWriter::new(store, config, variables).write_root(shape, result)?;
    tracing::debug!(records = changes.len(), "Normalized query result");
    Ok(store.apply(changes))
}

/// Rebuild the result tree of `shape` from `store`.
pub fn read_result(
    store: &EntityStore,
    vars: &VarRegistry,
    config: &CacheConfig,
    shape: &QueryShape,
    variables: &Value,
) -> Result<(ReadOutcome, Dependencies)> {
    QueryResultReader::new(store, vars, config, variables).read(shape)
}
