//! Relation merging: one record per (subject, subject attribute, object).

use async_trait::async_trait;

use specmap_core::Relation;

use crate::engine::MergePolicy;
use crate::policies::union_chunk_refs;

/// Merges relation candidates keyed by the exact
/// (subject, subject_attribute, object) triple.
#[derive(Debug, Default)]
pub struct RelationMergePolicy;

impl RelationMergePolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MergePolicy for RelationMergePolicy {
    type Item = Relation;

    fn same_entity(&self, a: &Relation, b: &Relation) -> bool {
        a.subject == b.subject
            && a.subject_attribute == b.subject_attribute
            && a.object == b.object
    }

    fn reconcile(&self, existing: &mut Relation, incoming: Relation) {
        if existing.name.trim().is_empty() && !incoming.name.trim().is_empty() {
            existing.name = incoming.name;
        }
        if incoming.short_description.trim().len() > existing.short_description.trim().len() {
            existing.short_description = incoming.short_description;
        }
        union_chunk_refs(&mut existing.relevant_chunks, incoming.relevant_chunks);
    }

    fn finalize(&self, merged: &mut Vec<Relation>) {
        merged.sort_by(|a, b| {
            a.subject
                .cmp(&b.subject)
                .then_with(|| a.subject_attribute.cmp(&b.subject_attribute))
                .then_with(|| a.object.cmp(&b.object))
        });
    }
}
