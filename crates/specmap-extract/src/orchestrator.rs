//! Chunk/document fan-out orchestration.
//!
//! Documents are processed concurrently under one bound; within a document
//! its chunks are processed concurrently under another. Per-chunk failures
//! are absorbed into the job's non-fatal error list, so one bad chunk never
//! aborts a document or the job. Completion order is unspecified at both
//! levels; anything that needs ordering is restored downstream by the merge
//! policies' explicit sorts.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::warn;
use uuid::Uuid;

use specmap_core::{
    defaults, Candidate, Chunk, ChunkRef, Document, ExtractionContext, HasProvenance, JobStore,
    ProgressUpdate,
};

use crate::backend::{ChunkExtractor, ExtractionOutcome};

/// Fan-out bounds for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum documents extracted concurrently.
    pub max_concurrent_documents: usize,
    /// Maximum chunks extracted concurrently within one document.
    pub max_concurrent_chunks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_documents: defaults::MAX_CONCURRENT_DOCUMENTS,
            max_concurrent_chunks: defaults::MAX_CONCURRENT_CHUNKS,
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SPECMAP_MAX_CONCURRENT_DOCUMENTS` | `3` |
    /// | `SPECMAP_MAX_CONCURRENT_CHUNKS` | `5` |
    pub fn from_env() -> Self {
        let max_concurrent_documents = std::env::var("SPECMAP_MAX_CONCURRENT_DOCUMENTS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::MAX_CONCURRENT_DOCUMENTS)
            .max(1);

        let max_concurrent_chunks = std::env::var("SPECMAP_MAX_CONCURRENT_CHUNKS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::MAX_CONCURRENT_CHUNKS)
            .max(1);

        Self {
            max_concurrent_documents,
            max_concurrent_chunks,
        }
    }

    pub fn with_max_concurrent_documents(mut self, max: usize) -> Self {
        self.max_concurrent_documents = max.max(1);
        self
    }

    pub fn with_max_concurrent_chunks(mut self, max: usize) -> Self {
        self.max_concurrent_chunks = max.max(1);
        self
    }
}

/// Everything one document contributed to a run.
#[derive(Debug, Clone)]
pub struct DocumentOutcome<T> {
    pub document_id: Uuid,
    /// Flattened candidates from every chunk, stamped with their origin.
    pub candidates: Vec<Candidate<T>>,
    /// Chunks whose extraction produced at least one candidate.
    pub relevant_chunks: Vec<ChunkRef>,
}

impl<T: HasProvenance> DocumentOutcome<T> {
    /// Consume the outcome, folding each candidate's origin into its value.
    pub fn into_values(self) -> Vec<T> {
        self.candidates
            .into_iter()
            .map(Candidate::into_value)
            .collect()
    }
}

/// One document's chunks plus the context its extraction calls receive.
#[derive(Debug, Clone)]
pub struct ChunkGroup {
    pub document_id: Uuid,
    pub chunks: Vec<Chunk>,
    pub context: ExtractionContext,
}

/// Drives extraction over documents and chunks, recording progress and
/// non-fatal errors on the owning job.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run an arbitrary per-document extraction over `documents`.
    ///
    /// Progress totals are set before the first document starts; the
    /// completed counter advances by exactly one as each document finishes,
    /// whatever order completions land in. The output order is unspecified;
    /// consumers key by `document_id`.
    pub async fn run_over_documents<T, F, Fut>(
        &self,
        documents: Vec<Document>,
        job_id: Uuid,
        per_document: F,
    ) -> Vec<DocumentOutcome<T>>
    where
        T: Send,
        F: Fn(Document) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = DocumentOutcome<T>> + Send,
    {
        self.begin_stage(job_id, documents.len() as u64).await;

        stream::iter(documents)
            .map(|document| {
                let work = per_document(document);
                async move {
                    let outcome = work.await;
                    self.advance_one_unit(job_id).await;
                    outcome
                }
            })
            .buffer_unordered(self.config.max_concurrent_documents.max(1))
            .collect::<Vec<_>>()
            .await
    }

    /// Run a chunk-level extractor over pre-chunked documents.
    ///
    /// One progress unit per group; chunks inside a group run concurrently
    /// under the chunk bound.
    pub async fn run_over_grouped_chunks<T, X>(
        &self,
        groups: Vec<ChunkGroup>,
        job_id: Uuid,
        extractor: &X,
    ) -> Vec<DocumentOutcome<T>>
    where
        T: Send,
        X: ChunkExtractor<T> + ?Sized,
    {
        self.begin_stage(job_id, groups.len() as u64).await;

        stream::iter(groups)
            .map(|group| {
                let ChunkGroup {
                    document_id,
                    chunks,
                    context,
                } = group;
                async move {
                    let outcome = self
                        .extract_document_chunks(document_id, chunks, &context, extractor, job_id)
                        .await;
                    self.advance_one_unit(job_id).await;
                    outcome
                }
            })
            .buffer_unordered(self.config.max_concurrent_documents.max(1))
            .collect::<Vec<_>>()
            .await
    }

    /// Extract every chunk of one document concurrently.
    ///
    /// A chunk whose outcome carries candidates is recorded as relevant; a
    /// failed or unparseable chunk appends one line to the job's error list
    /// and contributes nothing.
    pub async fn extract_document_chunks<T, X>(
        &self,
        document_id: Uuid,
        chunks: Vec<Chunk>,
        context: &ExtractionContext,
        extractor: &X,
        job_id: Uuid,
    ) -> DocumentOutcome<T>
    where
        T: Send,
        X: ChunkExtractor<T> + ?Sized,
    {
        let outcomes = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk_index, chunk)| async move {
                let outcome = extractor.extract(&chunk, context).await;
                (chunk_index, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_chunks.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut candidates = Vec::new();
        let mut relevant_chunks = Vec::new();
        for (chunk_index, outcome) in outcomes {
            let origin = ChunkRef {
                document_id,
                chunk_index,
            };
            match outcome {
                ExtractionOutcome::Candidates(values) => {
                    if values.is_empty() {
                        continue;
                    }
                    relevant_chunks.push(origin);
                    candidates.extend(
                        values
                            .into_iter()
                            .map(|value| Candidate { value, origin }),
                    );
                }
                ExtractionOutcome::ParseError { raw } => {
                    self.record_error(
                        job_id,
                        &format!(
                            "document {} chunk {}: unparseable extraction output: {}",
                            document_id,
                            chunk_index,
                            truncate_for_log(&raw, 200)
                        ),
                    )
                    .await;
                }
                ExtractionOutcome::CallError { cause } => {
                    self.record_error(
                        job_id,
                        &format!(
                            "document {} chunk {}: extraction call failed: {}",
                            document_id, chunk_index, cause
                        ),
                    )
                    .await;
                }
            }
        }

        // completion order is unspecified; normalize for stable output
        relevant_chunks.sort();
        candidates.sort_by_key(|candidate| candidate.origin.chunk_index);

        DocumentOutcome {
            document_id,
            candidates,
            relevant_chunks,
        }
    }

    async fn begin_stage(&self, job_id: Uuid, total_units: u64) {
        let update = ProgressUpdate::total(total_units).with_stage("extracting");
        if let Err(error) = self.store.update_progress(job_id, update).await {
            warn!(%job_id, %error, "failed to initialize job progress");
        }
    }

    async fn advance_one_unit(&self, job_id: Uuid) {
        if let Err(error) = self
            .store
            .update_progress(job_id, ProgressUpdate::advance(1))
            .await
        {
            warn!(%job_id, %error, "failed to advance job progress");
        }
    }

    async fn record_error(&self, job_id: Uuid, message: &str) {
        if let Err(error) = self.store.append_error(job_id, message).await {
            warn!(%job_id, %error, "failed to record non-fatal job error");
        }
    }
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
