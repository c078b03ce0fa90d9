//! # specmap-extract
//!
//! Extraction capability boundary and chunk/document orchestrator.
//!
//! This crate provides:
//! - A pluggable `ExtractionBackend` trait for the external structured
//!   extraction capability, with an Ollama implementation
//! - A normalization boundary that turns every backend reply into a tagged
//!   `ExtractionOutcome` before any other code sees it
//! - The `Orchestrator`, which fans extraction out across documents and
//!   chunks under bounded concurrency, records relevance provenance, and
//!   reports incremental job progress
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use specmap_extract::{Orchestrator, OrchestratorConfig, StructuredExtractor, OllamaBackend};
//! use specmap_core::{split, Endpoint, MemoryJobStore, TiktokenTokenizer};
//!
//! let store = Arc::new(MemoryJobStore::new());
//! let orchestrator = Orchestrator::new(store.clone());
//! let backend = Arc::new(OllamaBackend::from_env());
//! let extractor: StructuredExtractor<Endpoint> =
//!     StructuredExtractor::new(backend, |chunk, _ctx| {
//!         format!("List every HTTP endpoint in this excerpt:\n{}", chunk.text)
//!     });
//!
//! let outcomes = orchestrator
//!     .run_over_grouped_chunks(groups, job_id, &extractor)
//!     .await;
//! ```

pub mod backend;
pub mod ollama;
pub mod orchestrator;

// Scripted mock backend/extractor for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use specmap_core::*;

pub use backend::{
    parse_candidates, ChunkExtractor, ExtractionBackend, ExtractionOutcome, StructuredExtractor,
};
pub use ollama::OllamaBackend;
pub use orchestrator::{ChunkGroup, DocumentOutcome, Orchestrator, OrchestratorConfig};
