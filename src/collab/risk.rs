//! The risk signal boundary (§6.6).
//!
//! §9 is explicit that "risk score/level computation lives outside this
//! core; the boundary is specified but the formula is not" — so this trait
//! has no default scoring implementation, only a fake for tests, unlike the
//! other collaborators which get a "real" one grounded on the teacher.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::ids::{ActivityId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskSignal {
    pub score: f32,
    pub level: RiskLevel,
}

#[async_trait]
pub trait RiskSignalSource: Send + Sync {
    async fn current_risk(
        &self,
        student_id: &StudentId,
        activity_id: Option<&ActivityId>,
    ) -> Result<RiskSignal>;
}

#[cfg(any(test, feature = "test-util"))]
pub struct FakeRiskSignalSource {
    pub fixed: HashMap<String, RiskSignal>,
    pub default_signal: RiskSignal,
}

#[cfg(any(test, feature = "test-util"))]
impl Default for FakeRiskSignalSource {
    fn default() -> Self {
        Self {
            fixed: HashMap::new(),
            default_signal: RiskSignal {
                score: 0.0,
                level: RiskLevel::Low,
            },
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl FakeRiskSignalSource {
    pub fn with_default(default_signal: RiskSignal) -> Self {
        Self {
            fixed: HashMap::new(),
            default_signal,
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl RiskSignalSource for FakeRiskSignalSource {
    async fn current_risk(
        &self,
        student_id: &StudentId,
        _activity_id: Option<&ActivityId>,
    ) -> Result<RiskSignal> {
        Ok(self
            .fixed
            .get(student_id.as_str())
            .cloned()
            .unwrap_or_else(|| self.default_signal.clone()))
    }
}
