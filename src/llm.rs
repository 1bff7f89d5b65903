//! Text completion provider interface.
//!
//! The engine only consumes `complete(prompt) -> text`; answer quality is
//! the provider's business. An OpenAI-compatible chat client covers
//! OpenAI, DeepSeek and similar endpoints.

use crate::embedding::Backoff;
use crate::error::{ProviderError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Per-call HTTP timeout.
const CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// System prompt for standards Q&A. Answers follow the language of the
/// question.
pub const SYSTEM_PROMPT: &str = "\
You are an expert engineer specializing in electrical, mechanical and \
safety standards and building regulations.

INSTRUCTIONS:
1. Answer using ONLY the information in the provided context
2. Be precise with numbers, units, and technical specifications
3. Always cite sources (Document name, Section, Page, Table)
4. When reading tables, verify row/column carefully
5. Show calculations with units when needed
6. IMPORTANT: Always answer in the SAME LANGUAGE as the question.

ANSWER FORMAT:
- Direct answer first
- Technical details and values
- Source citations
- Important notes or safety warnings

If information is insufficient, state what's missing and suggest where \
to look. Do not add information not in the context. Do not make \
assumptions.";

/// Trait for completion providers.
pub trait Completer: Send + Sync {
    /// Completes a prompt into answer text.
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiCompleter {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    backoff: Backoff,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiCompleter {
    /// Creates a completer against the given endpoint.
    #[must_use]
    pub fn new(model: &str, api_key: &str, base_url: &str, temperature: f32) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .timeout_read(CALL_TIMEOUT)
                .timeout_write(CALL_TIMEOUT)
                .build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            backoff: Backoff::default(),
        }
    }
}

impl Completer for OpenAiCompleter {
    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .agent
                .post(&url)
                .set("Authorization", &format!("Bearer {}", self.api_key))
                .send_json(body.clone())
            {
                Ok(response) => {
                    let parsed: ChatResponse =
                        response.into_json().map_err(|e| ProviderError::BadResponse {
                            provider: "llm".to_string(),
                            reason: e.to_string(),
                        })?;
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| {
                            ProviderError::BadResponse {
                                provider: "llm".to_string(),
                                reason: "no choices in response".to_string(),
                            }
                            .into()
                        });
                }
                Err(e) => {
                    if attempts > self.backoff.max_retries {
                        return Err(ProviderError::RequestFailed {
                            provider: "llm".to_string(),
                            attempts,
                            reason: e.to_string(),
                        }
                        .into());
                    }
                    let delay = self.backoff.delay_ms(attempts);
                    warn!(attempt = attempts, delay_ms = delay, "completion call failed, retrying");
                    std::thread::sleep(Duration::from_millis(delay));
                }
            }
        }
    }
}
