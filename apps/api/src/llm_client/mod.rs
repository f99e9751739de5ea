/// LLM Client: the single point of entry for all text-generation calls in the ranker.
///
/// ARCHITECTURAL RULE: No other module may call the generation API directly.
/// All model interactions go through `GenerationBackend`, which this module implements
/// for the OpenAI chat-completions API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmSettings;

pub mod prompts;
#[cfg(test)]
pub mod testing;

/// Output length cap for every generation call.
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No usable response after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// A text-generation backend: takes a complete instruction and returns the raw model text.
///
/// Carried in `AppState` as `Arc<dyn GenerationBackend>` so tests can swap in a fake.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, instruction: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    store: bool,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Extracts the text content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// The generation client used by every ranking stage.
/// Wraps the chat-completions API with deterministic decoding, forced JSON output,
/// and bounded transport retries.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
    system_prompt: String,
}

impl LlmClient {
    pub fn new(settings: LlmSettings, system_prompt: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings,
            system_prompt,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn request<'a>(&'a self, instruction: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: instruction,
                },
            ],
            temperature: 0.0,
            max_tokens: MAX_TOKENS,
            store: false,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }

    /// Makes one call to the API, retrying transport errors, 429 and 5xx responses
    /// up to `max_retries` attempts with exponential backoff.
    pub async fn call(&self, instruction: &str) -> Result<ChatResponse, LlmError> {
        let request_body = self.request(instruction);
        let max_retries = self.settings.max_retries;
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.settings.retry_backoff_ms, attempt);
                warn!(
                    "Generation call attempt {}/{} failed, retrying after {}ms...",
                    attempt,
                    max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.settings.api_url)
                .bearer_auth(&self.settings.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Generation API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat_response: ChatResponse = match response.json().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            if let Some(usage) = &chat_response.usage {
                debug!(
                    "Generation call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens, usage.completion_tokens
                );
            }

            return Ok(chat_response);
        }

        Err(LlmError::Exhausted {
            attempts: max_retries,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts were made".to_string()),
        })
    }
}

#[async_trait]
impl GenerationBackend for LlmClient {
    async fn generate(&self, instruction: &str) -> Result<String, LlmError> {
        let response = self.call(instruction).await?;
        response
            .text()
            .map(str::to_owned)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Backoff before retry number `attempt` (1-based): base, 2×base, 4×base, ...
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
