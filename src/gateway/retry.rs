//! Exponential backoff with full jitter, grounded on `clawft-llm`'s
//! `RetryConfig`/`compute_delay`/`is_retryable` (`src/retry.rs`): same
//! `base_delay * 2^attempt` capped at `max_delay`, jitter computed from
//! system-clock nanoseconds rather than pulling a PRNG crate into the hot
//! retry path.

use std::time::Duration;

use crate::error::CoreError;

/// Only `ErrUpstream` and `ErrTimeout` are worth retrying (§4.L); everything
/// else is a caller mistake or a model-output problem retrying won't fix.
pub fn is_retryable(err: &CoreError) -> bool {
    err.is_retryable()
}

pub fn compute_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = base.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(max.as_millis() as u64);

    // Full jitter: delay is uniform in [0, capped_ms]. Seeded off the clock,
    // the way the teacher's enrichment source does it, since this path
    // doesn't need cryptographic randomness, just spread.
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let jittered_ms = if capped_ms > 0 { seed % (capped_ms + 1) } else { 0 };

    Duration::from_millis(jittered_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max() {
        let base = Duration::from_millis(250);
        let max = Duration::from_secs(10);
        for attempt in 0..10 {
            let d = compute_delay(base, max, attempt);
            assert!(d <= max);
        }
    }

    #[test]
    fn only_upstream_and_timeout_retry() {
        assert!(is_retryable(&CoreError::upstream("x")));
        assert!(is_retryable(&CoreError::timeout("x")));
        assert!(!is_retryable(&CoreError::request("x")));
        assert!(!is_retryable(&CoreError::contract("x")));
        assert!(!is_retryable(&CoreError::not_found("x")));
    }
}
