//! Centralized default constants for the specmap system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// CHUNKING
// =============================================================================

/// Default maximum tokens per chunk for text splitting.
pub const CHUNK_MAX_TOKENS: usize = 1000;

/// Default overlap ratio between adjacent chunks for context preservation.
pub const CHUNK_OVERLAP_RATIO: f32 = 0.1;

/// Upper bound for the overlap ratio; larger values are clamped, never
/// rejected, so a chunk run always makes forward progress.
pub const MAX_OVERLAP_RATIO: f32 = 0.9;

/// Separator between phrase-context snippets.
pub const CONTEXT_SNIPPET_SEPARATOR: &str = "\n...\n";

// =============================================================================
// ORCHESTRATION
// =============================================================================

/// Maximum documents extracted concurrently within one run.
pub const MAX_CONCURRENT_DOCUMENTS: usize = 3;

/// Maximum chunks extracted concurrently within one document.
pub const MAX_CONCURRENT_CHUNKS: usize = 5;

// =============================================================================
// JOBS
// =============================================================================

/// Default maximum number of jobs a worker processes concurrently.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Hard timeout for a single job execution (seconds).
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Error line recorded on jobs found `running` at startup.
pub const STALE_JOB_MESSAGE: &str = "previous process stopped while job was running";

/// Error line recorded on jobs whose backing task was cancelled.
pub const CANCELLED_JOB_MESSAGE: &str = "job cancelled before completion";

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// EXTRACTION BACKEND
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default generation model for structured extraction.
pub const EXTRACT_MODEL: &str = "llama3.1:8b";

/// Timeout for extraction requests (seconds).
pub const EXTRACT_TIMEOUT_SECS: u64 = 120;
