//! Auth mechanism merging: spelling variants of the same scheme collapse
//! into one record.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use specmap_core::AuthMechanism;

use crate::engine::MergePolicy;
use crate::policies::union_chunk_refs;
use crate::remote::{normalized_key, reorder_by_ranked_keys, AuthRanker};

/// Merges auth mechanisms keyed by normalized (name, type).
///
/// Name comparison is case- and whitespace-insensitive, and a name that
/// contains the other ("OAuth2" vs "OAuth 2.0 flow") counts as the same
/// mechanism; the longer spelling wins. An optional ranking call orders the
/// final list; on failure the merged order is kept, and mechanisms the
/// ranking did not mention keep their original relative order at the tail.
#[derive(Default)]
pub struct AuthMergePolicy {
    ranker: Option<Arc<dyn AuthRanker>>,
}

impl AuthMergePolicy {
    pub fn new() -> Self {
        Self { ranker: None }
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn AuthRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }
}

#[async_trait]
impl MergePolicy for AuthMergePolicy {
    type Item = AuthMechanism;

    fn same_entity(&self, a: &AuthMechanism, b: &AuthMechanism) -> bool {
        if normalized_key(&a.auth_type) != normalized_key(&b.auth_type) {
            return false;
        }
        let key_a = normalized_key(&a.name);
        let key_b = normalized_key(&b.name);
        if key_a.is_empty() || key_b.is_empty() {
            return key_a == key_b;
        }
        key_a.contains(&key_b) || key_b.contains(&key_a)
    }

    fn reconcile(&self, existing: &mut AuthMechanism, incoming: AuthMechanism) {
        if incoming.name.trim().len() > existing.name.trim().len() {
            existing.name = incoming.name;
        }

        let incoming_quirks = incoming.quirks.trim();
        if !incoming_quirks.is_empty() {
            if existing.quirks.trim().is_empty() {
                existing.quirks = incoming.quirks.clone();
            } else if !existing.quirks.contains(incoming_quirks) {
                existing.quirks = format!("{}; {}", existing.quirks, incoming_quirks);
            }
        }

        union_chunk_refs(&mut existing.relevant_chunks, incoming.relevant_chunks);
    }

    async fn refine(&self, merged: Vec<AuthMechanism>) -> Vec<AuthMechanism> {
        let Some(ranker) = &self.ranker else {
            return merged;
        };
        match ranker.rank(&merged).await {
            Ok(ranked) => {
                reorder_by_ranked_keys(merged, &ranked, |mechanism| normalized_key(&mechanism.name))
            }
            Err(error) => {
                warn!(%error, "auth importance ranking failed; keeping merged order");
                merged
            }
        }
    }
}
