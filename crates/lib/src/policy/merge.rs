//! Ready-made merge functions.
//!
//! ```
//! use normcache::{StoreValue, policy::{MergeContext, merge}, store::FieldKey};
//!
//! let field = FieldKey::new("tags");
//! let context = MergeContext { typename: "Post", field: &field };
//! let existing = StoreValue::List(vec!["a".into(), "b".into()]);
//! let incoming = StoreValue::List(vec!["b".into(), "c".into()]);
//!
//! let merged = merge::union_list()(Some(&existing), incoming, &context).unwrap();
//! assert_eq!(merged, StoreValue::List(vec!["a".into(), "b".into(), "c".into()]));
//! ```

use std::sync::Arc;

use super::{MergeContext, MergeFn};
use crate::{Result, store::StoreValue};

/// Wrap a closure as a [`MergeFn`].
pub fn from_fn<F>(merge: F) -> MergeFn
where
    F: Fn(Option<&StoreValue>, StoreValue, &MergeContext<'_>) -> Result<StoreValue>
        + Send
        + Sync
        + 'static,
{
    Arc::new(merge)
}

/// Always store the incoming value ("replace on refetch").
pub fn prefer_incoming() -> MergeFn {
    from_fn(|_existing, incoming, _context| Ok(incoming))
}

/// Reject incoming values once a value is stored. The first write still lands.
pub fn keep_existing() -> MergeFn {
    from_fn(|existing, incoming, context| match existing {
        Some(existing) => {
            tracing::trace!(
                typename = context.typename,
                field = %context.field,
                "Merge policy kept existing value"
            );
            Ok(existing.clone())
        }
        None => Ok(incoming),
    })
}

/// Element-wise union of lists: existing elements keep their order, incoming elements not
/// already present are appended in their order. Non-list values are replaced.
pub fn union_list() -> MergeFn {
    from_fn(|existing, incoming, _context| match (existing, incoming) {
        (Some(StoreValue::List(existing)), StoreValue::List(incoming)) => {
            let mut merged = existing.clone();
            for item in incoming {
                if !merged.contains(&item) {
                    merged.push(item);
                }
            }
            Ok(StoreValue::List(merged))
        }
        (_, incoming) => Ok(incoming),
    })
}
