//! Remote rerank/disambiguate/classify call boundary.
//!
//! These capabilities reorder or filter already-merged entities. Their
//! output is never trusted blindly: every returned item must match an input
//! by normalized key, unmatched output is discarded, and inputs absent from
//! the output are appended preserving their original relative order.

use async_trait::async_trait;

use specmap_core::{Attribute, AuthMechanism, ObjectClass, Result};

/// Normalized comparison key: lowercased with all whitespace removed, so
/// `"OAuth 2.0"` and `"oauth2.0"` compare equal.
pub fn normalized_key(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect()
}

/// Reorder `items` to follow `ranked` (a list of keys as returned by a
/// remote ranking call).
///
/// Ranked entries matching no input are dropped; inputs missing from the
/// ranking keep their original relative order at the tail.
pub fn reorder_by_ranked_keys<T>(
    items: Vec<T>,
    ranked: &[String],
    key: impl Fn(&T) -> String,
) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());

    for name in ranked {
        let wanted = normalized_key(name);
        for slot in slots.iter_mut() {
            if slot.as_ref().map_or(false, |item| key(item) == wanted) {
                if let Some(item) = slot.take() {
                    ordered.push(item);
                }
                break;
            }
        }
    }

    ordered.extend(slots.into_iter().flatten());
    ordered
}

/// Picks exactly one candidate when several chunks disagree about the same
/// attribute. Never merges fields across candidates.
#[async_trait]
pub trait AttributeDisambiguator: Send + Sync {
    /// Returns the index of the winning candidate.
    async fn pick(
        &self,
        owner_class: &str,
        name: &str,
        candidates: &[Attribute],
    ) -> Result<usize>;
}

/// Ranks auth mechanisms by importance.
#[async_trait]
pub trait AuthRanker: Send + Sync {
    /// Returns mechanism names, most important first.
    async fn rank(&self, mechanisms: &[AuthMechanism]) -> Result<Vec<String>>;
}

/// Relevance score for one object class.
#[derive(Debug, Clone)]
pub struct ClassRelevance {
    pub name: String,
    pub score: f32,
}

/// Scores object classes for relevance to the documented API.
#[async_trait]
pub trait ClassRelevanceClassifier: Send + Sync {
    async fn classify(&self, classes: &[ObjectClass]) -> Result<Vec<ClassRelevance>>;
}

/// Orders object classes by importance.
#[async_trait]
pub trait ClassImportanceRanker: Send + Sync {
    /// Returns class names, most important first.
    async fn rank(&self, class_names: &[String]) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_key_collapses_case_and_space() {
        assert_eq!(normalized_key("OAuth 2.0"), "oauth2.0");
        assert_eq!(normalized_key("  API  Key "), "apikey");
        assert_eq!(normalized_key("basic"), "basic");
        assert_eq!(normalized_key(""), "");
    }

    #[test]
    fn test_reorder_follows_ranking() {
        let items = vec!["basic", "oauth2", "api key"];
        let ranked = vec!["API Key".to_string(), "OAuth2".to_string()];
        let reordered = reorder_by_ranked_keys(items, &ranked, |s| normalized_key(s));
        assert_eq!(reordered, vec!["api key", "oauth2", "basic"]);
    }

    #[test]
    fn test_reorder_discards_unknown_output() {
        let items = vec!["basic"];
        let ranked = vec!["made up".to_string(), "Basic".to_string()];
        let reordered = reorder_by_ranked_keys(items, &ranked, |s| normalized_key(s));
        assert_eq!(reordered, vec!["basic"]);
    }

    #[test]
    fn test_reorder_appends_missing_inputs_in_order() {
        let items = vec!["a", "b", "c", "d"];
        let ranked = vec!["c".to_string()];
        let reordered = reorder_by_ranked_keys(items, &ranked, |s| normalized_key(s));
        assert_eq!(reordered, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_reorder_duplicate_ranked_names_consume_once() {
        let items = vec!["a", "b"];
        let ranked = vec!["b".to_string(), "b".to_string(), "a".to_string()];
        let reordered = reorder_by_ranked_keys(items, &ranked, |s| normalized_key(s));
        assert_eq!(reordered, vec!["b", "a"]);
    }
}
