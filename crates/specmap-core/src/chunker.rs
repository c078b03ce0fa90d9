//! Token-bounded text chunking for extraction over long documents.
//!
//! Splitting works on token windows, not characters: the whole text is
//! tokenized once, then fixed-size windows with a configurable overlap are
//! decoded back to text. Boundaries are a pure function of
//! (text, max_tokens, overlap_ratio, tokenizer), so re-running a job chunks
//! identically.

use regex::Regex;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::Chunk;

/// Trait for tokenization operations.
///
/// Implementations should be thread-safe and support the encode/decode
/// round trip the chunker relies on.
pub trait Tokenizer: Send + Sync {
    /// Count the number of tokens in the given text.
    fn count_tokens(&self, text: &str) -> usize;

    /// Encode text into token IDs.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token IDs back into text.
    fn decode(&self, tokens: &[u32]) -> String;

    /// Get the name/identifier of this tokenizer.
    fn name(&self) -> &str;
}

/// Tiktoken-based tokenizer implementation.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
    name: String,
}

impl TiktokenTokenizer {
    /// Create a new tokenizer for the specified model.
    ///
    /// # Errors
    /// Returns an error if the model is not recognized or BPE initialization
    /// fails.
    pub fn new(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| Error::Internal(format!("Failed to initialize tokenizer: {}", e)))?;

        Ok(Self {
            bpe,
            name: model.to_string(),
        })
    }

    /// Create a cl100k_base tokenizer, the default encoding for chunking.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Internal(format!("Failed to initialize cl100k_base: {}", e)))?;

        Ok(Self {
            bpe,
            name: "cl100k_base".to_string(),
        })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let token_vec: Vec<usize> = tokens.iter().map(|&t| t as usize).collect();
        self.bpe.decode(token_vec).unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Split text into overlapping token windows of at most `max_tokens` tokens.
///
/// `overlap_ratio` is clamped into `[0, MAX_OVERLAP_RATIO]`. Empty or
/// whitespace-only text yields an empty sequence.
///
/// # Errors
/// `Error::InvalidArgument` when `max_tokens` is zero.
pub fn split(
    text: &str,
    max_tokens: usize,
    overlap_ratio: f32,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<Chunk>> {
    if max_tokens == 0 {
        return Err(Error::InvalidArgument(
            "max_tokens must be positive".to_string(),
        ));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let ratio = overlap_ratio.clamp(0.0, defaults::MAX_OVERLAP_RATIO);
    let overlap = (max_tokens as f32 * ratio).floor() as usize;
    let step = (max_tokens - overlap).max(1);

    let tokens = tokenizer.encode(text);
    let mut chunks = Vec::with_capacity(tokens.len() / step + 1);
    let mut start = 0usize;
    while start < tokens.len() {
        let end = (start + max_tokens).min(tokens.len());
        let window = &tokens[start..end];
        chunks.push(Chunk {
            text: tokenizer.decode(window),
            token_count: window.len(),
        });
        start += step;
    }

    Ok(chunks)
}

/// Build a narrow verification context around every occurrence of `phrase`.
///
/// Occurrences are matched case-insensitively on word boundaries. Each match
/// is wrapped in a window of `tokens_before`/`tokens_after` tokens and the
/// snippets are joined by a separator line. Returns an empty string when
/// `phrase` or `text` is empty or nothing matches.
pub fn neighboring_context(
    phrase: &str,
    text: &str,
    tokens_before: usize,
    tokens_after: usize,
    tokenizer: &dyn Tokenizer,
) -> String {
    if phrase.trim().is_empty() || text.trim().is_empty() {
        return String::new();
    }

    let pattern = format!(r"(?i)\b{}\b", regex::escape(phrase.trim()));
    let matcher = match Regex::new(&pattern) {
        Ok(matcher) => matcher,
        Err(_) => return String::new(),
    };

    let mut snippets = Vec::new();
    for found in matcher.find_iter(text) {
        let lead_tokens = tokenizer.encode(&text[..found.start()]);
        let tail_tokens = tokenizer.encode(&text[found.end()..]);

        let lead_start = lead_tokens.len().saturating_sub(tokens_before);
        let lead = tokenizer.decode(&lead_tokens[lead_start..]);
        let tail_end = tokens_after.min(tail_tokens.len());
        let tail = tokenizer.decode(&tail_tokens[..tail_end]);

        snippets.push(format!("{}{}{}", lead, found.as_str(), tail));
    }

    snippets.join(defaults::CONTEXT_SNIPPET_SEPARATOR)
}
