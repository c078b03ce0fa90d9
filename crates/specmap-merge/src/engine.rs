//! Generic dedupe + reconcile merge.
//!
//! Folding the same multiset of candidates in any order must yield the same
//! key→value map, so policy `reconcile` implementations have to be
//! associative and commutative per key (longest-wins, boolean OR, set
//! union). Ordering of the final list is owned by `finalize` and the
//! optional `refine` step, never by arrival order.

use async_trait::async_trait;

/// Entity-specific merge behavior.
#[async_trait]
pub trait MergePolicy: Send + Sync {
    type Item: Send;

    /// Whether two records describe the same logical entity.
    fn same_entity(&self, a: &Self::Item, b: &Self::Item) -> bool;

    /// Fold one more candidate into the running merged value.
    fn reconcile(&self, existing: &mut Self::Item, incoming: Self::Item);

    /// Collapse one group of same-entity candidates into a single record.
    ///
    /// Groups are never empty. The default folds the group through
    /// `reconcile`; policies that pick one candidate instead of merging
    /// fields override this.
    async fn collapse(&self, mut group: Vec<Self::Item>) -> Self::Item {
        let mut merged = group.remove(0);
        for candidate in group {
            self.reconcile(&mut merged, candidate);
        }
        merged
    }

    /// Optional remote rerank/filter step over the merged set. Must fall
    /// back to its input when the remote capability fails.
    async fn refine(&self, merged: Vec<Self::Item>) -> Vec<Self::Item> {
        merged
    }

    /// Deterministic final ordering.
    fn finalize(&self, _merged: &mut Vec<Self::Item>) {}
}

/// Merge candidates into a canonical entity set under `policy`.
pub async fn merge<P: MergePolicy>(candidates: Vec<P::Item>, policy: &P) -> Vec<P::Item> {
    let mut groups: Vec<Vec<P::Item>> = Vec::new();
    for candidate in candidates {
        let slot = groups
            .iter_mut()
            .find(|group| group.iter().any(|member| policy.same_entity(member, &candidate)));
        match slot {
            Some(group) => group.push(candidate),
            None => groups.push(vec![candidate]),
        }
    }

    let mut merged = Vec::with_capacity(groups.len());
    for group in groups {
        merged.push(policy.collapse(group).await);
    }

    let mut merged = policy.refine(merged).await;
    policy.finalize(&mut merged);
    merged
}
