//! L. LLM Gateway — the only place that talks to the chat model (§4.L).
//!
//! Wraps an `Arc<dyn LlmProvider>` the way `clawft-llm`'s `RetryPolicy`
//! wraps an inner `Provider` (`src/retry.rs`): same retry-loop shape, same
//! `tracing::{debug, warn}` spans. The concurrency limiter is grounded on
//! the enrichment pack's `RAGPipeline::batch_ingest`
//! (`other_examples/.../rag_pipeline.rs`), which gates concurrent work with
//! an `Arc<tokio::sync::Semaphore>` and treats acquire failure as
//! configuration trouble rather than a retryable error.

pub mod json_recovery;
pub mod retry;

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::collab::llm::{ChatOptions, ChatRequest, CompletionResult, LlmProvider, TokenChunk};
use crate::config::GatewayConfig;
use crate::error::{CoreError, Result};

pub use json_recovery::recover_json;

pub struct Gateway {
    provider: Arc<dyn LlmProvider>,
    config: GatewayConfig,
    limiter: Arc<Semaphore>,
}

impl Gateway {
    pub fn new(provider: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            provider,
            config,
            limiter,
        }
    }

    #[instrument(skip(self, system, user), fields(model = %options.model))]
    pub async fn chat(&self, system: &str, user: &str, options: ChatOptions) -> Result<CompletionResult> {
        let deadline = options.timeout;
        let permit = tokio::time::timeout(deadline, self.limiter.clone().acquire_owned())
            .await
            .map_err(|_| CoreError::timeout("timed out waiting for gateway concurrency slot"))?
            .map_err(|_| CoreError::closed("gateway concurrency limiter closed"))?;

        let request = ChatRequest {
            system: system.to_string(),
            user: user.to_string(),
            options: options.clone(),
        };

        let result = tokio::time::timeout(deadline, self.call_with_retry(request)).await;
        drop(permit);

        match result {
            Ok(r) => r,
            Err(_) => Err(CoreError::timeout("chat call exceeded its deadline")),
        }
    }

    pub async fn chat_stream(
        &self,
        system: &str,
        user: &str,
        options: ChatOptions,
    ) -> Result<BoxStream<'static, TokenChunk>> {
        let deadline = options.timeout;
        let permit = tokio::time::timeout(deadline, self.limiter.clone().acquire_owned())
            .await
            .map_err(|_| CoreError::timeout("timed out waiting for gateway concurrency slot"))?
            .map_err(|_| CoreError::closed("gateway concurrency limiter closed"))?;

        let request = ChatRequest {
            system: system.to_string(),
            user: user.to_string(),
            options,
        };
        let stream = self.provider.chat_stream(request).await;
        drop(permit);
        stream
    }

    async fn call_with_retry(&self, request: ChatRequest) -> Result<CompletionResult> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            match self.provider.chat(request.clone()).await {
                Ok(completion) => {
                    if attempt > 0 {
                        debug!(attempt, "chat call succeeded after retry");
                    }
                    // JSON recovery (including the field-regex tier) is left
                    // to the caller, which knows the schema's required field
                    // names; see `crate::gateway::recover_json`.
                    return Ok(completion);
                }
                Err(err) => {
                    if !retry::is_retryable(&err) || attempt == self.config.max_retries {
                        return Err(err);
                    }
                    let delay = retry::compute_delay(self.config.backoff_base, self.config.backoff_max, attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, %err, "retrying chat call");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CoreError::upstream("retry loop exited without an error")))
    }
}

impl Clone for ChatRequest {
    fn clone(&self) -> Self {
        Self {
            system: self.system.clone(),
            user: self.user.clone(),
            options: self.options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::llm::FakeLlmProvider;

    fn opts() -> ChatOptions {
        ChatOptions {
            timeout: std::time::Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn retries_upstream_failures_then_succeeds() {
        let provider = Arc::new(FakeLlmProvider::new(vec![
            Err(CoreError::upstream("blip")),
            Ok("hello".to_string()),
        ]));
        let gateway = Gateway::new(provider.clone(), GatewayConfig {
            backoff_base: std::time::Duration::from_millis(1),
            backoff_max: std::time::Duration::from_millis(5),
            ..Default::default()
        });

        let result = gateway.chat("sys", "user", opts()).await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn never_retries_request_errors() {
        let provider = Arc::new(FakeLlmProvider::new(vec![Err(CoreError::request("bad input"))]));
        let gateway = Gateway::new(provider.clone(), GatewayConfig::default());

        let err = gateway.chat("sys", "user", opts()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Request);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_cap_and_surfaces_upstream() {
        let provider = Arc::new(FakeLlmProvider::new(vec![
            Err(CoreError::upstream("1")),
            Err(CoreError::upstream("2")),
            Err(CoreError::upstream("3")),
            Err(CoreError::upstream("4")),
        ]));
        let gateway = Gateway::new(
            provider.clone(),
            GatewayConfig {
                max_retries: 3,
                backoff_base: std::time::Duration::from_millis(1),
                backoff_max: std::time::Duration::from_millis(2),
                ..Default::default()
            },
        );

        let err = gateway.chat("sys", "user", opts()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Upstream);
        assert_eq!(provider.call_count(), 4);
    }
}
