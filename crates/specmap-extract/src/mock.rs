//! Scripted mock backend and extractor for deterministic testing.
//!
//! The mock backend matches prompts by substring and replies with canned
//! text; failures are scripted the same way, so error paths are exercised
//! without flakiness.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use specmap_core::{Chunk, Error, ExtractionContext, Result};

use crate::backend::{ChunkExtractor, ExtractionBackend, ExtractionOutcome};

/// Mock extraction backend with scripted replies and a call log.
#[derive(Clone, Default)]
pub struct MockExtractionBackend {
    responses: Vec<(String, String)>,
    failures: Vec<String>,
    default_response: String,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockExtractionBackend {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            failures: Vec::new(),
            default_response: "[]".to_string(),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with `response` for any prompt containing `fragment`.
    pub fn with_response_for(
        mut self,
        fragment: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.responses.push((fragment.into(), response.into()));
        self
    }

    /// Reply for prompts that match nothing else. Defaults to `"[]"`.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Fail any prompt containing `fragment`.
    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.failures.push(fragment.into());
        self
    }

    /// All prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionBackend for MockExtractionBackend {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.call_log.lock().unwrap().push(prompt.to_string());

        if let Some(fragment) = self.failures.iter().find(|f| prompt.contains(f.as_str())) {
            return Err(Error::Extraction(format!(
                "mock backend failed on \"{}\"",
                fragment
            )));
        }
        let reply = self
            .responses
            .iter()
            .find(|(fragment, _)| prompt.contains(fragment.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(reply)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Extractor driven by a plain closure, for orchestrator tests that want
/// full control over per-chunk outcomes.
pub struct ScriptedExtractor<F> {
    script: F,
}

impl<F> ScriptedExtractor<F> {
    pub fn new(script: F) -> Self {
        Self { script }
    }
}

#[async_trait]
impl<T, F> ChunkExtractor<T> for ScriptedExtractor<F>
where
    T: Send + 'static,
    F: Fn(&Chunk, &ExtractionContext) -> ExtractionOutcome<T> + Send + Sync,
{
    async fn extract(&self, chunk: &Chunk, ctx: &ExtractionContext) -> ExtractionOutcome<T> {
        (self.script)(chunk, ctx)
    }
}
