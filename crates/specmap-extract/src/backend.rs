//! Extraction capability boundary.
//!
//! The external capability is a black box that takes a prompt and returns
//! raw text. Everything it returns is normalized into a tagged
//! [`ExtractionOutcome`] immediately, so the orchestrator and merge code
//! never see raw model output.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use specmap_core::{Chunk, ExtractionContext, Result};

/// The raw external extraction capability.
///
/// Calls must be safely retryable: a retried call may produce a different
/// but still valid reply. Failures are surfaced as errors and absorbed
/// per chunk by the orchestrator.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Send one prompt and return the raw reply text.
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Identifier for logs.
    fn name(&self) -> &str;
}

/// Tagged result of one chunk extraction, produced by the normalization
/// boundary right after the external call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome<T> {
    /// The reply parsed into zero or more candidate records.
    Candidates(Vec<T>),
    /// The call succeeded but the reply was not parseable.
    ParseError { raw: String },
    /// The call itself failed.
    CallError { cause: String },
}

impl<T> ExtractionOutcome<T> {
    /// Whether this outcome marks its chunk as relevant: it produced at
    /// least one candidate.
    pub fn is_relevant(&self) -> bool {
        matches!(self, ExtractionOutcome::Candidates(items) if !items.is_empty())
    }
}

/// Parse raw reply text into candidates.
///
/// Accepts a JSON array, a bare JSON object (promoted to a one-element
/// list), and fenced code blocks around either. `null` and empty replies
/// mean "nothing found in this chunk", which is a valid result, not an
/// error.
pub fn parse_candidates<T: DeserializeOwned>(raw: &str) -> ExtractionOutcome<T> {
    let body = strip_code_fences(raw);
    if body.is_empty() || body == "null" {
        return ExtractionOutcome::Candidates(Vec::new());
    }
    if let Ok(items) = serde_json::from_str::<Vec<T>>(body) {
        return ExtractionOutcome::Candidates(items);
    }
    match serde_json::from_str::<T>(body) {
        Ok(item) => ExtractionOutcome::Candidates(vec![item]),
        Err(_) => ExtractionOutcome::ParseError {
            raw: raw.to_string(),
        },
    }
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// What the orchestrator consumes: one typed extraction per chunk.
#[async_trait]
pub trait ChunkExtractor<T>: Send + Sync {
    async fn extract(&self, chunk: &Chunk, ctx: &ExtractionContext) -> ExtractionOutcome<T>;
}

/// Prompt-driven extractor: builds a prompt per chunk, invokes the backend,
/// and normalizes the reply.
///
/// The prompt builder is supplied by the caller; prompt wording is not this
/// crate's concern.
pub struct StructuredExtractor<T> {
    backend: Arc<dyn ExtractionBackend>,
    prompt: Box<dyn Fn(&Chunk, &ExtractionContext) -> String + Send + Sync>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> StructuredExtractor<T> {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        prompt: impl Fn(&Chunk, &ExtractionContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            backend,
            prompt: Box::new(prompt),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T> ChunkExtractor<T> for StructuredExtractor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn extract(&self, chunk: &Chunk, ctx: &ExtractionContext) -> ExtractionOutcome<T> {
        let prompt = (self.prompt)(chunk, ctx);
        match self.backend.invoke(&prompt).await {
            Ok(raw) => {
                debug!(
                    backend = self.backend.name(),
                    response_len = raw.len(),
                    "normalizing extraction reply"
                );
                parse_candidates(&raw)
            }
            Err(error) => ExtractionOutcome::CallError {
                cause: error.to_string(),
            },
        }
    }
}
