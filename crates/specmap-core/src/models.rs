//! Data model for documents, chunks, extracted entities, and jobs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// DOCUMENTS AND CHUNKS
// =============================================================================

/// A source document, owned by the caller and read-only for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// Caller-supplied document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A token-bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub token_count: usize,
}

/// Provenance reference: which chunk of which document produced a candidate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChunkRef {
    pub document_id: Uuid,
    pub chunk_index: usize,
}

/// One extractor opinion about an entity, produced from exactly one chunk.
///
/// The origin stamp is applied by the orchestrator, never by the extractor.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub value: T,
    pub origin: ChunkRef,
}

impl<T: HasProvenance> Candidate<T> {
    /// Fold the origin stamp into the value's own provenance list and
    /// return the value.
    pub fn into_value(mut self) -> T {
        self.value.record_origin(self.origin);
        self.value
    }
}

/// Records that carry their own provenance list.
pub trait HasProvenance {
    fn record_origin(&mut self, origin: ChunkRef);
}

fn union_ref(refs: &mut Vec<ChunkRef>, origin: ChunkRef) {
    if !refs.contains(&origin) {
        refs.push(origin);
    }
}

/// Context fields handed to the extraction capability alongside each chunk.
///
/// Always constructed explicitly and passed in; there is no ambient default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ExtractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Build a context from a document's own metadata.
    pub fn for_document(document: &Document) -> Self {
        Self {
            summary: document.metadata.summary.clone(),
            tags: document.metadata.tags.clone(),
            extra: BTreeMap::new(),
        }
    }
}

// =============================================================================
// EXTRACTED ENTITIES
// =============================================================================

/// An API object class (resource or model) described by the documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub embedded: bool,
    #[serde(default)]
    pub description: String,
    /// Documents whose chunks produced this class, deduplicated.
    #[serde(default)]
    pub relevant_documents: Vec<Uuid>,
}

impl HasProvenance for ObjectClass {
    fn record_origin(&mut self, origin: ChunkRef) {
        if !self.relevant_documents.contains(&origin.document_id) {
            self.relevant_documents.push(origin.document_id);
        }
    }
}

/// An attribute (field/property) of an object class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Name of the class this attribute belongs to.
    #[serde(default)]
    pub owner_class: String,
    #[serde(default)]
    pub relevant_chunks: Vec<ChunkRef>,
}

impl HasProvenance for Attribute {
    fn record_origin(&mut self, origin: ChunkRef) {
        union_ref(&mut self.relevant_chunks, origin);
    }
}

/// An HTTP endpoint exposed by the documented API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    #[serde(default)]
    pub suggested_use: Vec<String>,
    #[serde(default)]
    pub relevant_chunks: Vec<ChunkRef>,
}

impl HasProvenance for Endpoint {
    fn record_origin(&mut self, origin: ChunkRef) {
        union_ref(&mut self.relevant_chunks, origin);
    }
}

/// An authentication mechanism accepted by the documented API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMechanism {
    pub name: String,
    #[serde(rename = "type", default)]
    pub auth_type: String,
    /// Free-form caveats ("tokens expire after 1h", "supports PKCE").
    #[serde(default)]
    pub quirks: String,
    #[serde(default)]
    pub relevant_chunks: Vec<ChunkRef>,
}

impl HasProvenance for AuthMechanism {
    fn record_origin(&mut self, origin: ChunkRef) {
        union_ref(&mut self.relevant_chunks, origin);
    }
}

/// A typed link between one class's attribute and another class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub subject: String,
    pub subject_attribute: String,
    pub object: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub relevant_chunks: Vec<ChunkRef>,
}

impl HasProvenance for Relation {
    fn record_origin(&mut self, origin: ChunkRef) {
        union_ref(&mut self.relevant_chunks, origin);
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// Lifecycle state of a background job.
///
/// `Queued -> Running` is the single-winner claim transition; `Finished` and
/// `Failed` are terminal except for the startup-recovery edge
/// `Running -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "finished" => Some(JobStatus::Finished),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// A background job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub input: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Advisory progress record, one per job, same lifetime as the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_units: Option<u64>,
    #[serde(default)]
    pub completed_units: u64,
}

impl JobProgress {
    pub fn empty(job_id: Uuid) -> Self {
        Self {
            job_id,
            stage: None,
            message: None,
            total_units: None,
            completed_units: 0,
        }
    }
}

/// Partial progress write. Counters advance by delta, never by absolute
/// value, so concurrent unit completions cannot lose increments.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub stage: Option<String>,
    pub message: Option<String>,
    pub total_units: Option<u64>,
    pub advance_units: u64,
}

impl ProgressUpdate {
    /// Set the expected unit count for the current stage.
    pub fn total(total_units: u64) -> Self {
        Self {
            total_units: Some(total_units),
            ..Self::default()
        }
    }

    /// Advance the completed counter by `units`.
    pub fn advance(units: u64) -> Self {
        Self {
            advance_units: units,
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Apply this update to a progress record.
    pub fn apply(self, progress: &mut JobProgress) {
        if let Some(stage) = self.stage {
            progress.stage = Some(stage);
        }
        if let Some(message) = self.message {
            progress.message = Some(message);
        }
        if let Some(total) = self.total_units {
            progress.total_units = Some(total);
        }
        progress.completed_units += self.advance_units;
    }
}

/// Snapshot returned to status-polling callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Deduplicate error lines, preserving first-seen order.
pub fn dedup_error_lines(lines: &[String]) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if !deduped.contains(line) {
            deduped.push(line.clone());
        }
    }
    deduped
}
