//! Ambient configuration: one plain, `Default`-able struct per component.
//!
//! Grounded on `sly::core::state::SlyConfig` — a `serde`-derived struct with
//! a hand-written `Default` impl carrying the project's pinned numbers. The
//! core never reads environment variables or files itself (§6: "no
//! environment-variable surface"); an outer API owns loading these and
//! passes the result in.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Cap on retried `ErrUpstream`/`ErrTimeout` attempts (§4.L default 3).
    pub max_retries: u32,
    /// Full-jitter exponential backoff base (§4.L default 250ms).
    pub backoff_base: Duration,
    /// Ceiling for the exponential backoff (kept well under request timeouts).
    pub backoff_max: Duration,
    /// Process-wide concurrency cap in front of the model (§4.L default 8).
    pub max_concurrency: usize,
    /// Wall-clock budget for a single `chat`/`chat_stream` call.
    pub default_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
            max_concurrency: 8,
            default_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Target chunk length in words (§4.R: ~500).
    pub chunk_target_words: usize,
    /// Overlap between consecutive chunks in words (§4.R: ~100).
    pub chunk_overlap_words: usize,
    /// Default top-k for `query`.
    pub default_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_target_words: 500,
            chunk_overlap_words: 100,
            default_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Required exercise count per draft (§3.1: target count = 10).
    pub target_count: usize,
    /// Difficulty mix as (EASY, MEDIUM, HARD) counts; must sum to `target_count`.
    pub difficulty_mix: (usize, usize, usize),
    /// RAG queries run per requirement (topic + each concept), k per query.
    pub rag_k_per_query: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            difficulty_mix: (3, 4, 3),
            rag_k_per_query: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    /// RAG top-k per `send` call (§4.T step 2: k=5).
    pub rag_k: usize,
    /// Hints allowed before forced escalation language (§4.T step 8: 3).
    pub hint_escalation_threshold: u32,
    /// Cumulative code-fence line budget per session (§4.T: default 10).
    pub code_fence_budget_lines: usize,
    /// Fence lines above which a single reply's fence is stripped outright (default 3).
    pub single_fence_hard_cap: usize,
    /// Messages of history included in the prompt (§4.T step 5: last 6).
    pub history_window: usize,
    /// Grace period of inactivity after which a session is considered stale.
    pub inactivity_grace: Duration,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            rag_k: 5,
            hint_escalation_threshold: 3,
            code_fence_budget_lines: 10,
            single_fence_hard_cap: 3,
            history_window: 6,
            inactivity_grace: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Messages pulled from the trace store (§4.A default 20).
    pub trace_window: usize,
    /// Messages actually summarized verbatim in the prompt (§4.A step 3: 10).
    pub summary_messages: usize,
    /// Low temperature for the auditor call (§4.A step 4: ~0.3).
    pub temperature: f32,
    /// Minimum evidence quotes required to avoid "ungrounded" (§4.A step 5).
    pub min_evidence_quotes: usize,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            trace_window: 20,
            summary_messages: 10,
            temperature: 0.3,
            min_evidence_quotes: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub gateway: GatewayConfig,
    pub rag: RagConfig,
    pub generator: GeneratorConfig,
    pub tutor: TutorConfig,
    pub analyst: AnalystConfig,
}
