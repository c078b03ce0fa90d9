//! Attribute merging: grouped by owner class, one winner per attribute name.
//!
//! Unlike the other policies this one never merges fields across candidates:
//! when several chunks disagree about the same attribute, a disambiguation
//! call picks exactly one of them. Provenance is bookkeeping rather than an
//! extracted field, so the winner still carries the union of the group's
//! chunk references.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use specmap_core::{Attribute, ChunkRef};

use crate::engine::MergePolicy;
use crate::policies::union_chunk_refs;
use crate::remote::{normalized_key, AttributeDisambiguator};

/// Merges attribute candidates keyed by (owner class, attribute name).
#[derive(Default)]
pub struct AttributeMergePolicy {
    disambiguator: Option<Arc<dyn AttributeDisambiguator>>,
}

impl AttributeMergePolicy {
    pub fn new() -> Self {
        Self {
            disambiguator: None,
        }
    }

    pub fn with_disambiguator(mut self, disambiguator: Arc<dyn AttributeDisambiguator>) -> Self {
        self.disambiguator = Some(disambiguator);
        self
    }

    async fn pick_winner(&self, group: &[Attribute]) -> usize {
        if let Some(disambiguator) = &self.disambiguator {
            let owner_class = group[0].owner_class.as_str();
            let name = group[0].name.as_str();
            match disambiguator.pick(owner_class, name, group).await {
                Ok(index) if index < group.len() => return index,
                Ok(index) => {
                    warn!(
                        index,
                        candidates = group.len(),
                        "disambiguation returned an out-of-range pick; using fallback"
                    );
                }
                Err(error) => {
                    warn!(%error, "attribute disambiguation failed; using fallback");
                }
            }
        }
        fallback_pick(group)
    }
}

/// Local fallback: the candidate whose description mentions the owner class
/// name, else the first candidate.
fn fallback_pick(group: &[Attribute]) -> usize {
    let owner = group[0].owner_class.trim().to_lowercase();
    if owner.is_empty() {
        return 0;
    }
    group
        .iter()
        .position(|candidate| candidate.description.to_lowercase().contains(&owner))
        .unwrap_or(0)
}

#[async_trait]
impl MergePolicy for AttributeMergePolicy {
    type Item = Attribute;

    fn same_entity(&self, a: &Attribute, b: &Attribute) -> bool {
        normalized_key(&a.owner_class) == normalized_key(&b.owner_class)
            && a.name.trim().eq_ignore_ascii_case(b.name.trim())
    }

    fn reconcile(&self, existing: &mut Attribute, incoming: Attribute) {
        // fields are never merged across candidates; only provenance folds
        union_chunk_refs(&mut existing.relevant_chunks, incoming.relevant_chunks);
    }

    async fn collapse(&self, mut group: Vec<Attribute>) -> Attribute {
        if group.len() == 1 {
            return group.remove(0);
        }

        let mut provenance: Vec<ChunkRef> = Vec::new();
        for candidate in &group {
            union_chunk_refs(&mut provenance, candidate.relevant_chunks.clone());
        }

        let winner = self.pick_winner(&group).await;
        let mut chosen = group.swap_remove(winner);
        chosen.relevant_chunks = provenance;
        chosen
    }

    fn finalize(&self, merged: &mut Vec<Attribute>) {
        merged.sort_by(|a, b| {
            normalized_key(&a.owner_class)
                .cmp(&normalized_key(&b.owner_class))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::merge;
    use specmap_core::{Error, Result};
    use uuid::Uuid;

    fn attribute(owner: &str, name: &str, description: &str) -> Attribute {
        Attribute {
            name: name.to_string(),
            description: description.to_string(),
            data_type: None,
            owner_class: owner.to_string(),
            relevant_chunks: Vec::new(),
        }
    }

    fn with_origin(mut attribute: Attribute, document_id: Uuid, chunk_index: usize) -> Attribute {
        attribute.relevant_chunks.push(ChunkRef {
            document_id,
            chunk_index,
        });
        attribute
    }

    #[tokio::test]
    async fn test_single_candidate_kept_as_is() {
        let merged = merge(
            vec![attribute("Invoice", "status", "open or paid")],
            &AttributeMergePolicy::new(),
        )
        .await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, "open or paid");
    }

    #[tokio::test]
    async fn test_same_name_different_owner_stays_separate() {
        let merged = merge(
            vec![
                attribute("Invoice", "status", ""),
                attribute("Payment", "status", ""),
            ],
            &AttributeMergePolicy::new(),
        )
        .await;
        assert_eq!(merged.len(), 2);
    }

    struct PickSecond;

    #[async_trait]
    impl AttributeDisambiguator for PickSecond {
        async fn pick(
            &self,
            _owner_class: &str,
            _name: &str,
            _candidates: &[Attribute],
        ) -> Result<usize> {
            Ok(1)
        }
    }

    struct PickOutOfRange;

    #[async_trait]
    impl AttributeDisambiguator for PickOutOfRange {
        async fn pick(
            &self,
            _owner_class: &str,
            _name: &str,
            _candidates: &[Attribute],
        ) -> Result<usize> {
            Ok(99)
        }
    }

    struct BrokenDisambiguator;

    #[async_trait]
    impl AttributeDisambiguator for BrokenDisambiguator {
        async fn pick(
            &self,
            _owner_class: &str,
            _name: &str,
            _candidates: &[Attribute],
        ) -> Result<usize> {
            Err(Error::MergeDependency("disambiguator offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_disambiguator_picks_one_candidate_without_field_merge() {
        let policy = AttributeMergePolicy::new().with_disambiguator(Arc::new(PickSecond));
        let doc = Uuid::new_v4();

        let merged = merge(
            vec![
                with_origin(attribute("Invoice", "total", "sum of lines"), doc, 0),
                with_origin(attribute("Invoice", "total", "amount in cents"), doc, 3),
            ],
            &policy,
        )
        .await;

        assert_eq!(merged.len(), 1);
        // the second candidate's fields, untouched
        assert_eq!(merged[0].description, "amount in cents");
        // provenance is the union of the whole group
        assert_eq!(
            merged[0]
                .relevant_chunks
                .iter()
                .map(|r| r.chunk_index)
                .collect::<Vec<_>>(),
            vec![0, 3]
        );
    }

    #[tokio::test]
    async fn test_fallback_prefers_description_mentioning_owner() {
        for policy in [
            AttributeMergePolicy::new(),
            AttributeMergePolicy::new().with_disambiguator(Arc::new(BrokenDisambiguator)),
            AttributeMergePolicy::new().with_disambiguator(Arc::new(PickOutOfRange)),
        ] {
            let merged = merge(
                vec![
                    attribute("Invoice", "id", "opaque identifier"),
                    attribute("Invoice", "id", "unique id of the invoice record"),
                ],
                &policy,
            )
            .await;
            assert_eq!(merged.len(), 1);
            assert_eq!(merged[0].description, "unique id of the invoice record");
        }
    }

    #[tokio::test]
    async fn test_fallback_first_when_no_description_matches() {
        let merged = merge(
            vec![
                attribute("Invoice", "id", "opaque identifier"),
                attribute("Invoice", "id", "primary key"),
            ],
            &AttributeMergePolicy::new(),
        )
        .await;
        assert_eq!(merged[0].description, "opaque identifier");
    }

    #[tokio::test]
    async fn test_finalize_sorts_by_owner_then_name() {
        let merged = merge(
            vec![
                attribute("Payment", "amount", ""),
                attribute("Invoice", "Total", ""),
                attribute("Invoice", "id", ""),
            ],
            &AttributeMergePolicy::new(),
        )
        .await;
        let keys: Vec<(String, String)> = merged
            .iter()
            .map(|a| (a.owner_class.clone(), a.name.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Invoice".to_string(), "id".to_string()),
                ("Invoice".to_string(), "Total".to_string()),
                ("Payment".to_string(), "amount".to_string()),
            ]
        );
    }
}
