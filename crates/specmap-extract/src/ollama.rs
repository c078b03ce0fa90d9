//! Ollama implementation of the extraction capability.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use specmap_core::{defaults, Error, Result};

use crate::backend::ExtractionBackend;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = defaults::OLLAMA_URL;

/// Default extraction model.
pub const DEFAULT_EXTRACT_MODEL: &str = defaults::EXTRACT_MODEL;

/// Ollama-backed extraction capability.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_OLLAMA_URL.to_string(),
            DEFAULT_EXTRACT_MODEL.to_string(),
        )
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(base_url: String, model: String) -> Self {
        let timeout_secs = std::env::var("SPECMAP_EXTRACT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EXTRACT_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        info!(
            "Initializing Ollama extraction backend: url={}, model={}",
            base_url, model
        );

        Self {
            client,
            base_url,
            model,
            timeout_secs,
        }
    }

    /// Create from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SPECMAP_OLLAMA_URL` | `http://localhost:11434` |
    /// | `SPECMAP_EXTRACT_MODEL` | `llama3.1:8b` |
    /// | `SPECMAP_EXTRACT_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        let base_url = std::env::var("SPECMAP_OLLAMA_URL")
            .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = std::env::var("SPECMAP_EXTRACT_MODEL")
            .unwrap_or_else(|_| DEFAULT_EXTRACT_MODEL.to_string());

        Self::with_config(base_url, model)
    }

    /// Check whether the Ollama server is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama health check returned an error status");
                Ok(false)
            }
            Err(error) => {
                warn!(%error, "Ollama health check failed");
                Ok(false)
            }
        }
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl ExtractionBackend for OllamaBackend {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            // extraction wants reproducible output, not creativity
            options: ChatOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to parse response: {}", e)))?;

        debug!(
            model = %self.model,
            prompt_len = prompt.len(),
            response_len = result.message.content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "extraction call completed"
        );

        Ok(result.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
