//! The typed error surface for the whole core.
//!
//! Grounded on `clawft-llm`'s `ProviderError` (thiserror, one variant per
//! failure mode the caller can act on) generalized from "provider errors"
//! to the eight kinds §7 of the spec names. Every public operation on the
//! five engines and the trace/job store returns `Result<T, CoreError>`.

use thiserror::Error;

/// The closed set of error kinds a caller can match on.
///
/// `CoreError::kind()` exposes this so an outer API can map it to a
/// transport status code without matching on the full enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Request,
    NotFound,
    Conflict,
    Upstream,
    Timeout,
    Contract,
    CorruptSource,
    Closed,
}

#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller supplied invalid input (bad indices, unknown job, empty required field).
    #[error("invalid request: {0}")]
    Request(String),

    /// Entity or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// State-machine violation (publishing twice, sending to a closed session).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient failure from a collaborator; retryable by the core up to a cap.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Deadline exceeded.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Model output failed all JSON recovery attempts.
    #[error("contract violation: {0}")]
    Contract(String),

    /// PDF (or other source) unreadable.
    #[error("corrupt source: {0}")]
    CorruptSource(String),

    /// Operation targets a terminal entity.
    #[error("closed: {0}")]
    Closed(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Request(_) => ErrorKind::Request,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Upstream(_) => ErrorKind::Upstream,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Contract(_) => ErrorKind::Contract,
            CoreError::CorruptSource(_) => ErrorKind::CorruptSource,
            CoreError::Closed(_) => ErrorKind::Closed,
        }
    }

    /// §4.L retry policy: only upstream/timeout failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Upstream(_) | CoreError::Timeout(_))
    }

    pub fn request(msg: impl Into<String>) -> Self {
        CoreError::Request(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        CoreError::Upstream(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        CoreError::Timeout(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        CoreError::Contract(msg.into())
    }

    pub fn corrupt_source(msg: impl Into<String>) -> Self {
        CoreError::CorruptSource(msg.into())
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        CoreError::Closed(msg.into())
    }
}

/// Collaborator implementations (HTTP clients, the cozo backend) are free to
/// bubble up `anyhow::Error` internally, the way the teacher's `Cortex` and
/// `CozoBackend` do; this converts any opaque failure into an `ErrUpstream`
/// at the boundary where it re-enters core logic.
impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::upstream("x").is_retryable());
        assert!(CoreError::timeout("x").is_retryable());
        assert!(!CoreError::request("x").is_retryable());
        assert!(!CoreError::contract("x").is_retryable());
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(CoreError::request("x").kind(), ErrorKind::Request);
        assert_eq!(CoreError::closed("x").kind(), ErrorKind::Closed);
    }
}
