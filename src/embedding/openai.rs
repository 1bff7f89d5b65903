//! OpenAI-compatible embedding client over HTTP.

use crate::embedding::{truncate_for_embedding, Backoff, Embedder, MAX_BATCH_SIZE};
use crate::error::{ProviderError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI embeddings endpoint.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Per-call HTTP timeout.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP embedder for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    backoff: Backoff,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Creates an embedder for the given model and key.
    #[must_use]
    pub fn new(model: &str, api_key: &str, dimensions: usize) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .timeout_read(CALL_TIMEOUT)
                .timeout_write(CALL_TIMEOUT)
                .build(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimensions,
            backoff: Backoff::default(),
        }
    }

    /// Overrides the API base URL (for compatible providers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn call(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self
                .agent
                .post(&url)
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .send_json(body.clone());

            match result {
                Ok(response) => {
                    let parsed: EmbeddingResponse =
                        response.into_json().map_err(|e| ProviderError::BadResponse {
                            provider: "embedding".to_string(),
                            reason: e.to_string(),
                        })?;
                    let mut rows = parsed.data;
                    rows.sort_by_key(|r| r.index);
                    let vectors: Vec<Vec<f32>> = rows.into_iter().map(|r| r.embedding).collect();
                    if vectors.len() != inputs.len() {
                        return Err(ProviderError::BadResponse {
                            provider: "embedding".to_string(),
                            reason: format!(
                                "expected {} embeddings, got {}",
                                inputs.len(),
                                vectors.len()
                            ),
                        }
                        .into());
                    }
                    debug!(count = vectors.len(), "embedded batch");
                    return Ok(vectors);
                }
                Err(e) => {
                    if attempts > self.backoff.max_retries {
                        return Err(ProviderError::RequestFailed {
                            provider: "embedding".to_string(),
                            attempts,
                            reason: e.to_string(),
                        }
                        .into());
                    }
                    let delay = self.backoff.delay_ms(attempts);
                    warn!(attempt = attempts, delay_ms = delay, "embedding call failed, retrying");
                    std::thread::sleep(Duration::from_millis(delay));
                }
            }
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.call(&[truncate_for_embedding(text)])?;
        vectors.into_iter().next().ok_or_else(|| {
            ProviderError::BadResponse {
                provider: "embedding".to_string(),
                reason: "empty embedding response".to_string(),
            }
            .into()
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let truncated: Vec<&str> =
                batch.iter().map(|t| truncate_for_embedding(t)).collect();
            out.extend(self.call(&truncated)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let embedder = OpenAiEmbedder::new("text-embedding-3-small", "sk-test", 1536)
            .with_base_url("https://example.test/v1/");
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.base_url, "https://example.test/v1");
    }

    #[test]
    fn test_unreachable_endpoint_errors() {
        // Reserved TEST-NET address; connection fails fast and retries are
        // exhausted without a network dependency on the test environment.
        let embedder = OpenAiEmbedder::new("m", "k", 4).with_base_url("http://192.0.2.1:1");
        let embedder = OpenAiEmbedder {
            backoff: Backoff {
                base_ms: 1,
                cap_ms: 1,
                max_retries: 1,
            },
            ..embedder
        };
        let err = embedder.embed("text").unwrap_err();
        assert_eq!(err.kind(), "provider");
        assert!(err.retryable());
    }
}
