//! Object class merging: one record per normalized class name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use specmap_core::ObjectClass;

use crate::engine::MergePolicy;
use crate::policies::keep_longer;
use crate::remote::{
    normalized_key, reorder_by_ranked_keys, ClassImportanceRanker, ClassRelevanceClassifier,
};

/// Merges object class candidates keyed by lowercased name with whitespace
/// variants collapsed ("User Profile" and "UserProfile" are one class).
///
/// Two optional remote steps run over the merged set: a relevance
/// classification whose threshold filter drops unscored classes, and an
/// importance sort with an alphabetical fallback. Both steps reorder or
/// filter the full original records, never re-derived ones.
#[derive(Default)]
pub struct ObjectClassMergePolicy {
    relevance: Option<(Arc<dyn ClassRelevanceClassifier>, f32)>,
    importance: Option<Arc<dyn ClassImportanceRanker>>,
}

impl ObjectClassMergePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the relevance classification step; classes scoring below
    /// `threshold` (or missing from a valid reply) are dropped.
    pub fn with_relevance_filter(
        mut self,
        classifier: Arc<dyn ClassRelevanceClassifier>,
        threshold: f32,
    ) -> Self {
        self.relevance = Some((classifier, threshold));
        self
    }

    /// Enable the importance sort step.
    pub fn with_importance_ranker(mut self, ranker: Arc<dyn ClassImportanceRanker>) -> Self {
        self.importance = Some(ranker);
        self
    }
}

fn sort_alphabetical(classes: &mut [ObjectClass]) {
    classes.sort_by_key(|class| class.name.to_lowercase());
}

#[async_trait]
impl MergePolicy for ObjectClassMergePolicy {
    type Item = ObjectClass;

    fn same_entity(&self, a: &ObjectClass, b: &ObjectClass) -> bool {
        normalized_key(&a.name) == normalized_key(&b.name)
    }

    fn reconcile(&self, existing: &mut ObjectClass, incoming: ObjectClass) {
        if existing
            .superclass
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
        {
            if let Some(superclass) = incoming.superclass {
                if !superclass.trim().is_empty() {
                    existing.superclass = Some(superclass);
                }
            }
        }
        existing.is_abstract |= incoming.is_abstract;
        existing.embedded |= incoming.embedded;
        keep_longer(&mut existing.description, incoming.description);
        for document_id in incoming.relevant_documents {
            if !existing.relevant_documents.contains(&document_id) {
                existing.relevant_documents.push(document_id);
            }
        }
    }

    async fn collapse(&self, mut group: Vec<ObjectClass>) -> ObjectClass {
        let mut merged = group.remove(0);
        merged.name = merged.name.trim().to_string();
        for candidate in group {
            self.reconcile(&mut merged, candidate);
        }
        merged.relevant_documents.sort();
        merged
    }

    async fn refine(&self, mut merged: Vec<ObjectClass>) -> Vec<ObjectClass> {
        if let Some((classifier, threshold)) = &self.relevance {
            match classifier.classify(&merged).await {
                Ok(scores) => {
                    let scores: HashMap<String, f32> = scores
                        .into_iter()
                        .map(|score| (normalized_key(&score.name), score.score))
                        .collect();
                    let before = merged.len();
                    merged.retain(|class| {
                        scores
                            .get(&normalized_key(&class.name))
                            .map_or(false, |score| *score >= *threshold)
                    });
                    debug!(
                        kept = merged.len(),
                        dropped = before - merged.len(),
                        "relevance filter applied"
                    );
                }
                Err(error) => {
                    warn!(%error, "class relevance classification failed; keeping all classes");
                }
            }
        }

        match &self.importance {
            Some(ranker) => {
                let names: Vec<String> =
                    merged.iter().map(|class| class.name.clone()).collect();
                match ranker.rank(&names).await {
                    Ok(ranked) => {
                        reorder_by_ranked_keys(merged, &ranked, |class| normalized_key(&class.name))
                    }
                    Err(error) => {
                        warn!(%error, "class importance ranking failed; sorting alphabetically");
                        sort_alphabetical(&mut merged);
                        merged
                    }
                }
            }
            None => {
                sort_alphabetical(&mut merged);
                merged
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::merge;
    use crate::remote::ClassRelevance;
    use specmap_core::{Error, Result};
    use uuid::Uuid;

    fn class(name: &str, description: &str) -> ObjectClass {
        ObjectClass {
            name: name.to_string(),
            superclass: None,
            is_abstract: false,
            embedded: false,
            description: description.to_string(),
            relevant_documents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_whitespace_variants_collapse() {
        let merged = merge(
            vec![
                class("User Profile", "short"),
                class("UserProfile", "a much longer description"),
                class("user profile", ""),
            ],
            &ObjectClassMergePolicy::new(),
        )
        .await;

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "User Profile");
        assert_eq!(merged[0].description, "a much longer description");
    }

    #[tokio::test]
    async fn test_reconcile_rules() {
        let mut a = class("Invoice", "first");
        a.superclass = Some("Record".to_string());
        a.is_abstract = false;
        let mut b = class("invoice", "a longer description here");
        b.superclass = Some("Ledger".to_string());
        b.is_abstract = true;
        b.embedded = true;

        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        a.relevant_documents = vec![doc_a];
        b.relevant_documents = vec![doc_b, doc_a];

        let merged = merge(vec![a, b], &ObjectClassMergePolicy::new()).await;
        assert_eq!(merged.len(), 1);
        let merged = &merged[0];

        // first non-empty superclass wins
        assert_eq!(merged.superclass.as_deref(), Some("Record"));
        // booleans OR-combine
        assert!(merged.is_abstract);
        assert!(merged.embedded);
        assert_eq!(merged.description, "a longer description here");

        let mut expected = vec![doc_a, doc_b];
        expected.sort();
        assert_eq!(merged.relevant_documents, expected);
    }

    #[tokio::test]
    async fn test_default_order_is_alphabetical() {
        let merged = merge(
            vec![class("Webhook", ""), class("Account", ""), class("invoice", "")],
            &ObjectClassMergePolicy::new(),
        )
        .await;
        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Account", "invoice", "Webhook"]);
    }

    struct FixedClassifier(Vec<ClassRelevance>);

    #[async_trait]
    impl ClassRelevanceClassifier for FixedClassifier {
        async fn classify(&self, _classes: &[ObjectClass]) -> Result<Vec<ClassRelevance>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl ClassRelevanceClassifier for BrokenClassifier {
        async fn classify(&self, _classes: &[ObjectClass]) -> Result<Vec<ClassRelevance>> {
            Err(Error::MergeDependency("classifier offline".to_string()))
        }
    }

    struct FixedRanker(Vec<String>);

    #[async_trait]
    impl ClassImportanceRanker for FixedRanker {
        async fn rank(&self, _class_names: &[String]) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRanker;

    #[async_trait]
    impl ClassImportanceRanker for BrokenRanker {
        async fn rank(&self, _class_names: &[String]) -> Result<Vec<String>> {
            Err(Error::MergeDependency("ranker offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_relevance_filter_drops_unmatched_and_low_scores() {
        let classifier = FixedClassifier(vec![
            ClassRelevance {
                name: "Account".to_string(),
                score: 0.9,
            },
            ClassRelevance {
                name: "Webhook".to_string(),
                score: 0.2,
            },
            // "Invoice" missing from the reply: dropped
        ]);
        let policy =
            ObjectClassMergePolicy::new().with_relevance_filter(Arc::new(classifier), 0.5);

        let merged = merge(
            vec![class("Account", ""), class("Webhook", ""), class("Invoice", "")],
            &policy,
        )
        .await;

        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Account"]);
    }

    #[tokio::test]
    async fn test_relevance_failure_keeps_everything() {
        let policy =
            ObjectClassMergePolicy::new().with_relevance_filter(Arc::new(BrokenClassifier), 0.5);

        let merged = merge(vec![class("Account", ""), class("Webhook", "")], &policy).await;
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_importance_ranker_orders_full_records() {
        let mut account = class("Account", "the money holder");
        account.is_abstract = true;
        let policy = ObjectClassMergePolicy::new().with_importance_ranker(Arc::new(
            FixedRanker(vec!["Webhook".to_string(), "Account".to_string()]),
        ));

        let merged = merge(vec![account, class("Webhook", "")], &policy).await;
        assert_eq!(merged[0].name, "Webhook");
        // the reordered item is the original record, not a re-derived one
        assert_eq!(merged[1].description, "the money holder");
        assert!(merged[1].is_abstract);
    }

    #[tokio::test]
    async fn test_importance_failure_falls_back_alphabetical() {
        let policy =
            ObjectClassMergePolicy::new().with_importance_ranker(Arc::new(BrokenRanker));
        let merged = merge(
            vec![class("Webhook", ""), class("Account", "")],
            &policy,
        )
        .await;
        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Account", "Webhook"]);
    }

    #[tokio::test]
    async fn test_merge_shuffle_invariant() {
        let candidates = vec![
            class("User Profile", "short"),
            class("Invoice", "bills"),
            class("UserProfile", "a longer description"),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let baseline = merge(candidates, &ObjectClassMergePolicy::new()).await;
        let shuffled = merge(reversed, &ObjectClassMergePolicy::new()).await;

        assert_eq!(baseline.len(), shuffled.len());
        for (a, b) in baseline.iter().zip(shuffled.iter()) {
            assert_eq!(normalized_key(&a.name), normalized_key(&b.name));
            assert_eq!(a.description, b.description);
        }
    }
}
