//! # specmap-core
//!
//! Core types, traits, and abstractions for the specmap extraction engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other specmap crates depend on: the document/chunk/candidate
//! model, the job and progress records, the token-bounded chunker, and the
//! `JobStore`/`DocumentSource` contracts.

pub mod chunker;
pub mod defaults;
pub mod error;
pub mod memory;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use chunker::{neighboring_context, split, TiktokenTokenizer, Tokenizer};
pub use error::{Error, Result};
pub use memory::{MemoryDocumentSource, MemoryJobStore};
pub use models::*;
pub use traits::{DocumentSource, JobStore};
