//! # specmap-merge
//!
//! Turns many per-chunk candidate records into one canonical entity set.
//!
//! The engine is a generic dedupe + reconcile fold parameterized by an
//! entity-specific [`MergePolicy`]; the five shipped policies cover object
//! classes, attributes, endpoints, auth mechanisms, and relations. Policies
//! may call a remote rerank/disambiguate/classify capability, but every
//! remote step validates its output against the inputs by normalized key
//! and falls back to a local rule when the call fails.

pub mod engine;
pub mod policies;
pub mod remote;

// Re-export core types
pub use specmap_core::*;

pub use engine::{merge, MergePolicy};
pub use policies::{
    AttributeMergePolicy, AuthMergePolicy, EndpointMergePolicy, ObjectClassMergePolicy,
    RelationMergePolicy,
};
pub use remote::{
    normalized_key, reorder_by_ranked_keys, AttributeDisambiguator, AuthRanker, ClassImportanceRanker,
    ClassRelevance, ClassRelevanceClassifier,
};
