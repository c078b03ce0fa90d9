//! Endpoint merging: one record per (path, method).

use std::cmp::Ordering;

use async_trait::async_trait;

use specmap_core::Endpoint;

use crate::engine::MergePolicy;
use crate::policies::{fill_if_empty, keep_longer, union_chunk_refs};

/// Canonical method ordering for the final endpoint list.
const METHOD_ORDER: [&str; 7] = ["GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH", "DELETE"];

fn method_rank(method: &str) -> usize {
    METHOD_ORDER
        .iter()
        .position(|m| *m == method)
        .unwrap_or(METHOD_ORDER.len())
}

/// Merges endpoint candidates keyed by trimmed path (case-insensitive) and
/// uppercased method; the first-seen path spelling is retained.
#[derive(Debug, Default)]
pub struct EndpointMergePolicy;

impl EndpointMergePolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MergePolicy for EndpointMergePolicy {
    type Item = Endpoint;

    fn same_entity(&self, a: &Endpoint, b: &Endpoint) -> bool {
        a.path.trim().eq_ignore_ascii_case(b.path.trim())
            && a.method.trim().eq_ignore_ascii_case(b.method.trim())
    }

    fn reconcile(&self, existing: &mut Endpoint, incoming: Endpoint) {
        keep_longer(&mut existing.description, incoming.description);
        fill_if_empty(
            &mut existing.request_content_type,
            incoming.request_content_type,
        );
        fill_if_empty(
            &mut existing.response_content_type,
            incoming.response_content_type,
        );
        for suggestion in incoming.suggested_use {
            if !existing.suggested_use.contains(&suggestion) {
                existing.suggested_use.push(suggestion);
            }
        }
        union_chunk_refs(&mut existing.relevant_chunks, incoming.relevant_chunks);
    }

    async fn collapse(&self, mut group: Vec<Endpoint>) -> Endpoint {
        let mut merged = group.remove(0);
        merged.path = merged.path.trim().to_string();
        merged.method = merged.method.trim().to_uppercase();
        for candidate in group {
            self.reconcile(&mut merged, candidate);
        }
        merged
    }

    fn finalize(&self, merged: &mut Vec<Endpoint>) {
        merged.sort_by(|a, b| match a.path.cmp(&b.path) {
            Ordering::Equal => method_rank(&a.method)
                .cmp(&method_rank(&b.method))
                .then_with(|| a.method.cmp(&b.method)),
            other => other,
        });
    }
}
