//! The LLM provider boundary (§6.1).
//!
//! The trait shape is grounded on `clawft-llm`'s `Provider` (`name` +
//! `async fn complete`); the default implementation's request plumbing is
//! grounded on `sly`'s `Cortex::generate` (`src/core/cortex.rs`) —
//! `systemInstruction`/`contents` JSON payload, `x-goog-api-key` header,
//! primary-model-then-fallback-model behavior — generalized behind the
//! trait instead of being a concrete struct callers reach into directly.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub expect_json: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout: Duration::from_secs(30),
            expect_json: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub options: ChatOptions,
}

#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub text: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TokenChunk {
    pub delta: String,
    pub done: bool,
}

/// The only place in the core that is allowed to talk to a chat model.
///
/// Implementations own retries against *their own* transport quirks if they
/// want to, but the gateway (`crate::gateway`) is what applies the cap-3
/// retry/backoff/concurrency policy from §4.L — providers themselves should
/// fail fast and let the gateway decide whether to retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<CompletionResult>;

    async fn chat_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, TokenChunk>> {
        let result = self.chat(request).await?;
        Ok(Box::pin(stream::iter(vec![TokenChunk {
            delta: result.text,
            done: true,
        }])))
    }
}

/// Reqwest-backed Gemini implementation, generalized off `Cortex::generate`.
pub struct GeminiLlmProvider {
    api_key: String,
    client: reqwest::Client,
    fallback_model: String,
}

impl GeminiLlmProvider {
    pub fn new(api_key: impl Into<String>, fallback_model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            fallback_model: fallback_model.into(),
        }
    }

    async fn call_model(&self, model: &str, request: &ChatRequest) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            model
        );

        let payload = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "parts": [{ "text": request.user }] }],
            "generationConfig": {
                "temperature": request.options.temperature,
                "maxOutputTokens": request.options.max_tokens,
            }
        });

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .timeout(request.options.timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| CoreError::upstream(format!("malformed response body: {e}")))?;

        extract_text(&body)
            .ok_or_else(|| CoreError::upstream(format!("no text in {model} response")))
    }
}

#[async_trait]
impl LlmProvider for GeminiLlmProvider {
    async fn chat(&self, request: ChatRequest) -> Result<CompletionResult> {
        let primary = request.options.model.clone();
        match self.call_model(&primary, &request).await {
            Ok(text) => Ok(CompletionResult { text, model: primary }),
            Err(primary_err) if primary_err.kind() == crate::error::ErrorKind::Request => {
                Err(primary_err)
            }
            Err(_) => {
                let text = self.call_model(&self.fallback_model, &request).await?;
                Ok(CompletionResult {
                    text,
                    model: self.fallback_model.clone(),
                })
            }
        }
    }
}

fn extract_text(body: &serde_json::Value) -> Option<String> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

fn classify_reqwest_error(e: &reqwest::Error) -> CoreError {
    if e.is_timeout() {
        CoreError::timeout(e.to_string())
    } else {
        CoreError::upstream(e.to_string())
    }
}

fn classify_status(status: u16, body: &str) -> CoreError {
    if (400..500).contains(&status) {
        CoreError::request(format!("status {status}: {body}"))
    } else {
        CoreError::upstream(format!("status {status}: {body}"))
    }
}

/// Hand-written test double, in the shape of `clawft-llm`'s `MockProvider`:
/// a queue of canned responses plus a failure counter, no mocking framework.
#[cfg(any(test, feature = "test-util"))]
pub struct FakeLlmProvider {
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
    pub calls: std::sync::atomic::AtomicU32,
}

#[cfg(any(test, feature = "test-util"))]
impl FakeLlmProvider {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().collect()),
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl LlmProvider for FakeLlmProvider {
    async fn chat(&self, request: ChatRequest) -> Result<CompletionResult> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut queue = self.responses.lock().unwrap();
        let next = queue
            .pop_front()
            .unwrap_or_else(|| Err(CoreError::upstream("fake provider exhausted")));
        next.map(|text| CompletionResult {
            text,
            model: request.options.model,
        })
    }
}
