//! Entity-specific merge policies.

pub mod attribute;
pub mod auth;
pub mod endpoint;
pub mod object_class;
pub mod relation;

pub use attribute::AttributeMergePolicy;
pub use auth::AuthMergePolicy;
pub use endpoint::EndpointMergePolicy;
pub use object_class::ObjectClassMergePolicy;
pub use relation::RelationMergePolicy;

use specmap_core::ChunkRef;

/// Union `src` into `dst` preserving first-seen order.
pub(crate) fn union_chunk_refs(dst: &mut Vec<ChunkRef>, src: Vec<ChunkRef>) {
    for origin in src {
        if !dst.contains(&origin) {
            dst.push(origin);
        }
    }
}

/// Replace `existing` when `incoming` is non-empty and strictly longer.
pub(crate) fn keep_longer(existing: &mut String, incoming: String) {
    if !incoming.trim().is_empty() && incoming.len() > existing.len() {
        *existing = incoming;
    }
}

/// Fill an empty optional field from `incoming`.
pub(crate) fn fill_if_empty(existing: &mut Option<String>, incoming: Option<String>) {
    let is_empty = existing.as_deref().map_or(true, |s| s.trim().is_empty());
    if is_empty {
        if let Some(value) = incoming {
            if !value.trim().is_empty() {
                *existing = Some(value);
            }
        }
    }
}
