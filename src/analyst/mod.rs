//! A. Pedagogical Analyst — one-shot diagnostic pipeline over a student's
//! trace (§4.A).

pub mod prompts;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::collab::llm::ChatOptions;
use crate::collab::risk::RiskSignalSource;
use crate::collab::trace::{TraceQuery, TraceReader};
use crate::config::AnalystConfig;
use crate::error::{CoreError, Result};
use crate::gateway::{recover_json, Gateway};
use crate::ids::{now, ActivityId, AuditId, StudentId, Timestamp};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<crate::collab::risk::RiskLevel> for RiskLevel {
    fn from(level: crate::collab::risk::RiskLevel) -> Self {
        match level {
            crate::collab::risk::RiskLevel::Low => RiskLevel::Low,
            crate::collab::risk::RiskLevel::Medium => RiskLevel::Medium,
            crate::collab::risk::RiskLevel::High => RiskLevel::High,
            crate::collab::risk::RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosisCategory {
    Syntax,
    Logic,
    Conceptual,
    CognitiveOverload,
    Behavioral,
}

impl DiagnosisCategory {
    fn parse(tag: &str) -> Option<Self> {
        match tag.to_uppercase().as_str() {
            "SYNTAX" => Some(Self::Syntax),
            "LOGIC" => Some(Self::Logic),
            "CONCEPTUAL" => Some(Self::Conceptual),
            "COGNITIVE_OVERLOAD" => Some(Self::CognitiveOverload),
            "BEHAVIORAL" => Some(Self::Behavioral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedagogicalAudit {
    pub analysis_id: AuditId,
    pub student_id: StudentId,
    pub activity_id: Option<ActivityId>,
    pub risk_score: f32,
    pub risk_level: RiskLevel,
    pub diagnosis_category: Option<DiagnosisCategory>,
    pub diagnosis: String,
    pub evidence: Vec<String>,
    pub intervention: String,
    pub confidence: f32,
    pub status: AuditStatus,
    pub created_at: Timestamp,
}

#[derive(Deserialize)]
struct RawAudit {
    diagnosis_category: String,
    diagnosis_detail: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    intervention: String,
    #[serde(default)]
    confidence: f32,
}

pub struct AnalystEngine {
    store: Arc<Store>,
    gateway: Arc<Gateway>,
    risk: Arc<dyn RiskSignalSource>,
    config: AnalystConfig,
}

impl AnalystEngine {
    pub fn new(store: Arc<Store>, gateway: Arc<Gateway>, risk: Arc<dyn RiskSignalSource>, config: AnalystConfig) -> Self {
        Self {
            store,
            gateway,
            risk,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn audit(
        &self,
        student_id: &StudentId,
        activity_id: Option<&ActivityId>,
        include_trace: bool,
    ) -> Result<PedagogicalAudit> {
        let risk = self.risk.current_risk(student_id, activity_id).await?;

        // Step 1: pull the last N messages, optionally filtered by activity.
        let messages = self
            .store
            .read_messages(TraceQuery {
                student_id: Some(student_id.clone()),
                activity_id: activity_id.cloned(),
                session_id: None,
                limit: Some(self.config.trace_window),
                since: None,
            })
            .await?;

        if !include_trace || messages.is_empty() {
            let audit = PedagogicalAudit {
                analysis_id: AuditId::new(),
                student_id: student_id.clone(),
                activity_id: activity_id.cloned(),
                risk_score: risk.score,
                risk_level: risk.level.into(),
                diagnosis_category: None,
                diagnosis: String::new(),
                evidence: Vec::new(),
                intervention: String::new(),
                confidence: 0.0,
                status: AuditStatus::Failed,
                created_at: now(),
            };
            self.store.create_audit(audit.clone())?;
            return Ok(audit);
        }

        // Step 2+3: derived metrics and trace summary.
        let metrics = prompts::compute_metrics(&messages);
        let trace_text = messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
        let summary = prompts::summarize_trace(&messages, &metrics, self.config.summary_messages);

        // Step 4: call the LLM at low temperature for a strict JSON diagnosis.
        let options = ChatOptions {
            temperature: self.config.temperature,
            expect_json: true,
            max_tokens: 1024,
            ..Default::default()
        };
        let user = prompts::user_prompt(&summary);
        let raw: RawAudit = match self
            .gateway
            .chat(prompts::SYSTEM_PROMPT, &user, options)
            .await
            .and_then(|completion| recover_json(&completion.text, &["diagnosis_category", "diagnosis_detail"]))
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| CoreError::contract(format!("audit response did not match schema: {e}")))
            }) {
            Ok(raw) => raw,
            Err(e) => {
                // §4.A/§9: ErrContract (or any gateway failure) inside the
                // analyst fails the audit rather than propagating, so callers
                // always get a persisted, retryable result back.
                warn!(student_id = %student_id, error = %e, "audit model call was unparseable");
                let audit = PedagogicalAudit {
                    analysis_id: AuditId::new(),
                    student_id: student_id.clone(),
                    activity_id: activity_id.cloned(),
                    risk_score: risk.score,
                    risk_level: risk.level.into(),
                    diagnosis_category: None,
                    diagnosis: "unparseable".to_string(),
                    evidence: Vec::new(),
                    intervention: String::new(),
                    confidence: 0.0,
                    status: AuditStatus::Failed,
                    created_at: now(),
                };
                self.store.create_audit(audit.clone())?;
                return Ok(audit);
            }
        };

        // Step 5: drop ungrounded evidence quotes.
        let grounded_evidence: Vec<String> = raw
            .evidence
            .into_iter()
            .filter(|quote| trace_text.contains(quote.as_str()))
            .collect();

        if grounded_evidence.len() < self.config.min_evidence_quotes {
            warn!(student_id = %student_id, "audit evidence did not survive grounding check");
            let audit = PedagogicalAudit {
                analysis_id: AuditId::new(),
                student_id: student_id.clone(),
                activity_id: activity_id.cloned(),
                risk_score: risk.score,
                risk_level: risk.level.into(),
                diagnosis_category: DiagnosisCategory::parse(&raw.diagnosis_category),
                diagnosis: raw.diagnosis_detail,
                evidence: Vec::new(),
                intervention: raw.intervention,
                confidence: raw.confidence,
                status: AuditStatus::Failed,
                created_at: now(),
            };
            self.store.create_audit(audit.clone())?;
            return Ok(audit);
        }

        // Step 6: persist and return.
        let audit = PedagogicalAudit {
            analysis_id: AuditId::new(),
            student_id: student_id.clone(),
            activity_id: activity_id.cloned(),
            risk_score: risk.score,
            risk_level: risk.level.into(),
            diagnosis_category: DiagnosisCategory::parse(&raw.diagnosis_category),
            diagnosis: raw.diagnosis_detail,
            evidence: grounded_evidence,
            intervention: raw.intervention,
            confidence: raw.confidence,
            status: AuditStatus::Completed,
            created_at: now(),
        };
        self.store.create_audit(audit.clone())?;
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::llm::FakeLlmProvider;
    use crate::collab::risk::{FakeRiskSignalSource, RiskSignal};
    use crate::collab::trace::TraceWriter;
    use crate::config::GatewayConfig;
    use crate::ids::{ActivityId, MessageId, SessionId};
    use crate::tutor::phase::Phase;
    use crate::tutor::{ErrorContext, Message, Sender};

    fn engine(
        responses: Vec<Result<String>>,
        risk: Arc<FakeRiskSignalSource>,
    ) -> (AnalystEngine, Arc<Store>) {
        let store = Arc::new(Store::new());
        let provider = Arc::new(FakeLlmProvider::new(responses));
        let gateway = Arc::new(Gateway::new(provider, GatewayConfig::default()));
        let engine = AnalystEngine::new(store.clone(), gateway, risk, AnalystConfig::default());
        (engine, store)
    }

    fn trace_message(student_id: StudentId, activity_id: ActivityId, content: &str, has_error: bool) -> Message {
        Message {
            message_id: MessageId::new(),
            session_id: SessionId::new(),
            student_id,
            activity_id,
            sender: Sender::Student,
            content: content.to_string(),
            code_snapshot: None,
            error_context: has_error.then(|| ErrorContext {
                error_type: "IndentationError".to_string(),
                detail: "unexpected indent on line 4".to_string(),
            }),
            phase: Phase::Debugging,
            frustration: 0.6,
            understanding: 0.3,
            timestamp: now(),
        }
    }

    #[tokio::test]
    async fn repeated_syntax_errors_diagnose_as_syntax() {
        let student_id = StudentId::new();
        let activity_id = ActivityId::new();
        let risk = Arc::new(FakeRiskSignalSource::with_default(RiskSignal {
            score: 0.7,
            level: crate::collab::risk::RiskLevel::High,
        }));
        let (engine, store) = engine(
            vec![Ok(r#"{
                "diagnosis_category": "SYNTAX",
                "diagnosis_detail": "Repeated IndentationError suggests a syntax-level misunderstanding.",
                "evidence": ["IndentationError", "IndentationError", "IndentationError"],
                "intervention": "Review Python's whitespace rules.",
                "confidence": 0.8
            }"#
            .to_string())],
            risk,
        );

        for _ in 0..3 {
            store
                .append_message(trace_message(student_id.clone(), activity_id.clone(), "it says IndentationError again", true))
                .await
                .unwrap();
        }

        let audit = engine.audit(&student_id, Some(&activity_id), true).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Completed);
        assert_eq!(audit.diagnosis_category, Some(DiagnosisCategory::Syntax));
        assert!(audit.evidence.iter().any(|q| q.contains("IndentationError")));
        assert!(audit.confidence >= 0.5);
    }

    #[tokio::test]
    async fn ungrounded_evidence_fails_the_audit() {
        let student_id = StudentId::new();
        let activity_id = ActivityId::new();
        let risk = Arc::new(FakeRiskSignalSource::with_default(RiskSignal {
            score: 0.2,
            level: crate::collab::risk::RiskLevel::Low,
        }));
        let (engine, store) = engine(
            vec![Ok(r#"{
                "diagnosis_category": "LOGIC",
                "diagnosis_detail": "Unclear.",
                "evidence": ["this quote does not appear anywhere in the trace"],
                "intervention": "n/a",
                "confidence": 0.2
            }"#
            .to_string())],
            risk,
        );

        store
            .append_message(trace_message(student_id.clone(), activity_id.clone(), "hello there", false))
            .await
            .unwrap();

        let audit = engine.audit(&student_id, Some(&activity_id), true).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Failed);
        assert!(audit.evidence.is_empty());
    }

    #[tokio::test]
    async fn empty_trace_fails_without_calling_the_model() {
        let student_id = StudentId::new();
        let risk = Arc::new(FakeRiskSignalSource::with_default(RiskSignal {
            score: 0.1,
            level: crate::collab::risk::RiskLevel::Low,
        }));
        let (engine, _store) = engine(vec![], risk);

        let audit = engine.audit(&student_id, None, true).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Failed);
    }

    #[tokio::test]
    async fn unparseable_model_response_fails_the_audit_instead_of_erroring() {
        let student_id = StudentId::new();
        let activity_id = ActivityId::new();
        let risk = Arc::new(FakeRiskSignalSource::with_default(RiskSignal {
            score: 0.4,
            level: crate::collab::risk::RiskLevel::Medium,
        }));
        let (engine, store) = engine(
            vec![Ok("not json, and no recognizable fields either".to_string())],
            risk,
        );

        store
            .append_message(trace_message(student_id.clone(), activity_id.clone(), "still broken", true))
            .await
            .unwrap();

        let audit = engine.audit(&student_id, Some(&activity_id), true).await.unwrap();
        assert_eq!(audit.status, AuditStatus::Failed);
        assert_eq!(audit.diagnosis, "unparseable");
        assert!(audit.evidence.is_empty());
    }
}
