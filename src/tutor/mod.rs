//! T. Tutor Session Engine — Socratic, RAG-grounded, affect-aware (§4.T).

pub mod affect;
pub mod guard;
pub mod phase;
pub mod prompts;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;

use crate::collab::llm::ChatOptions;
use crate::config::TutorConfig;
use crate::error::{CoreError, Result};
use crate::gateway::Gateway;
use crate::ids::{now, ActivityId, CourseId, MessageId, SessionId, StudentId, Timestamp};
use crate::rag::RagSubstrate;
use crate::store::Store;

use affect::{AffectConfig, AffectInput};
use phase::{Phase, TransitionSignals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Student,
    Tutor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub error_type: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub activity_id: ActivityId,
    pub sender: Sender,
    pub content: String,
    pub code_snapshot: Option<String>,
    pub error_context: Option<ErrorContext>,
    pub phase: Phase,
    pub frustration: f32,
    pub understanding: f32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveState {
    pub phase: Phase,
    pub frustration: f32,
    pub understanding: f32,
    pub hint_count_in_phase: u32,
    pub total_interactions: u32,
    /// Cumulative code-fence lines emitted so far in the session, counted
    /// down from the configured budget (§4.T answer-leakage invariant).
    pub fence_budget_remaining: usize,
    /// Signature (`error_type:detail`) of the most recent student submission's
    /// error, used to detect repeated identical errors across two consecutive
    /// submissions (§4.T step 3's frustration marker).
    pub last_error_signature: Option<String>,
    /// Expected concepts the student has mentioned at least once, so the
    /// understanding step-up only fires on the first mention of each.
    pub mentioned_concepts: HashSet<String>,
    /// Expected concepts currently flagged as a point of confusion (mentioned
    /// alongside a frustration marker) but not yet resolved.
    pub flagged_confusions: HashSet<String>,
    /// Expected concepts whose flagged confusion was later resolved (mentioned
    /// alongside a progress marker); restating one decays understanding.
    pub resolved_confusions: HashSet<String>,
}

impl CognitiveState {
    pub fn initial(fence_budget: usize) -> Self {
        Self {
            phase: Phase::Exploration,
            frustration: 0.0,
            understanding: 0.5,
            hint_count_in_phase: 0,
            total_interactions: 0,
            fence_budget_remaining: fence_budget,
            last_error_signature: None,
            mentioned_concepts: HashSet::new(),
            flagged_confusions: HashSet::new(),
            resolved_confusions: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TutorSession {
    pub session_id: SessionId,
    pub student_id: StudentId,
    pub activity_id: ActivityId,
    pub course_id: CourseId,
    pub instructions: String,
    pub expected_concepts: Vec<String>,
    pub starter_code: String,
    pub state: CognitiveState,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub course_id: CourseId,
    pub instructions: String,
    pub expected_concepts: Vec<String>,
    pub starter_code: String,
    pub collection_key: String,
}

#[derive(Debug, Clone)]
pub struct TutorReply {
    pub message: Message,
    pub degraded: bool,
}

pub struct TutorEngine {
    store: Arc<Store>,
    gateway: Arc<Gateway>,
    rag: Arc<RagSubstrate>,
    config: TutorConfig,
    affect_config: AffectConfig,
    /// Per-session serialization lock (§5: "each session is single-threaded").
    session_locks: tokio::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TutorEngine {
    pub fn new(store: Arc<Store>, gateway: Arc<Gateway>, rag: Arc<RagSubstrate>, config: TutorConfig) -> Self {
        Self {
            store,
            gateway,
            rag,
            config,
            affect_config: AffectConfig::default(),
            session_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: &SessionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.as_str().to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    #[instrument(skip(self, activity))]
    pub async fn open(&self, student_id: StudentId, activity_id: ActivityId, activity: ActivityContext) -> Result<SessionId> {
        let session_id = SessionId::new();
        let session = TutorSession {
            session_id: session_id.clone(),
            student_id: student_id.clone(),
            activity_id: activity_id.clone(),
            course_id: activity.course_id,
            instructions: activity.instructions,
            expected_concepts: activity.expected_concepts,
            starter_code: activity.starter_code,
            state: CognitiveState::initial(self.config.code_fence_budget_lines),
            is_active: true,
            created_at: now(),
            ended_at: None,
        };
        self.store.create_session(session)?;

        let opening = prompts::canned_fallback(Phase::Exploration);
        let message = Message {
            message_id: MessageId::new(),
            session_id: session_id.clone(),
            student_id,
            activity_id,
            sender: Sender::Tutor,
            content: opening.to_string(),
            code_snapshot: None,
            error_context: None,
            phase: Phase::Exploration,
            frustration: 0.0,
            understanding: 0.5,
            timestamp: now(),
        };
        crate::collab::trace::TraceWriter::append_message(self.store.as_ref(), message).await?;

        Ok(session_id)
    }

    #[instrument(skip(self, student_message, current_code, collection_key))]
    pub async fn send(
        &self,
        session_id: &SessionId,
        student_message: &str,
        current_code: Option<&str>,
        error_context: Option<ErrorContext>,
        collection_key: &str,
        signals: TransitionSignals,
    ) -> Result<TutorReply> {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let session = self.store.get_session(session_id)?;
        if !session.is_active {
            return Err(CoreError::closed(format!("session {session_id} is closed")));
        }

        // Step 1: append the student message with current state.
        let student_msg = Message {
            message_id: MessageId::new(),
            session_id: session_id.clone(),
            student_id: session.student_id.clone(),
            activity_id: session.activity_id.clone(),
            sender: Sender::Student,
            content: student_message.to_string(),
            code_snapshot: current_code.map(|s| s.to_string()),
            error_context: error_context.clone(),
            phase: session.state.phase,
            frustration: session.state.frustration,
            understanding: session.state.understanding,
            timestamp: now(),
        };
        crate::collab::trace::TraceWriter::append_message(self.store.as_ref(), student_msg).await?;

        // Step 2: RAG query, tolerating a missing collection.
        let rag_query = match current_code {
            Some(code) => format!("{student_message}\n{code}"),
            None => student_message.to_string(),
        };
        let retrieved = self
            .rag
            .query_or_empty(collection_key, &rag_query, self.config.rag_k)
            .await;
        let rag_context: Vec<String> = retrieved.into_iter().map(|c| c.text).collect();

        // Step 3: affect update.
        let lower_message = student_message.to_lowercase();
        let error_signature = error_context.as_ref().map(|e| format!("{}:{}", e.error_type, e.detail));
        let repeats_prior_error = error_signature.is_some() && session.state.last_error_signature == error_signature;

        let matches_frustration_marker = self
            .affect_config
            .frustration_markers
            .iter()
            .any(|m| lower_message.contains(m.as_str()));
        let matches_progress_marker = self
            .affect_config
            .progress_markers
            .iter()
            .any(|m| lower_message.contains(m.as_str()));

        let mentioned_now: Vec<String> = session
            .expected_concepts
            .iter()
            .filter(|c| lower_message.contains(&c.to_lowercase()))
            .cloned()
            .collect();

        let first_mention_of_expected_concept = mentioned_now
            .iter()
            .any(|c| !session.state.mentioned_concepts.contains(c));
        let restates_resolved_confusion =
            matches_frustration_marker && mentioned_now.iter().any(|c| session.state.resolved_confusions.contains(c));

        let affect_input = AffectInput {
            message: student_message,
            has_new_code_lines: current_code.is_some(),
            is_clarifying_question: student_message.trim_end().ends_with('?'),
            is_reflection: lower_message.contains("i think"),
            repeats_prior_error,
            first_mention_of_expected_concept,
            restates_resolved_confusion,
        };

        // Step 4: phase transition before the model call.
        let has_new_code = current_code.is_some();
        let error_type = error_context.as_ref().map(|e| e.error_type.as_str());

        let updated_session = self.store.update_session(session_id, |s| {
            let (frustration, understanding) = affect::update_affect(
                &self.affect_config,
                s.state.frustration,
                s.state.understanding,
                affect_input,
            );
            s.state.frustration = frustration;
            s.state.understanding = understanding;
            s.state.last_error_signature = error_signature.clone();

            for concept in &mentioned_now {
                s.state.mentioned_concepts.insert(concept.clone());
            }
            if matches_frustration_marker {
                for concept in &mentioned_now {
                    s.state.flagged_confusions.insert(concept.clone());
                }
            }
            if matches_progress_marker {
                for concept in &mentioned_now {
                    if s.state.flagged_confusions.remove(concept) {
                        s.state.resolved_confusions.insert(concept.clone());
                    }
                }
            }

            let next = phase::next_phase(s.state.phase, student_message, has_new_code, error_type, &signals);
            if next != s.state.phase {
                s.state.hint_count_in_phase = 0;
            }
            s.state.phase = next;
            s.state.total_interactions += 1;
            Ok(())
        })?;

        // Step 5+6: build prompts and call the gateway, degrading on failure.
        let system = prompts::system_prompt(&session.expected_concepts);
        let history = crate::collab::trace::TraceReader::read_messages(
            self.store.as_ref(),
            crate::collab::trace::TraceQuery {
                session_id: Some(session_id.clone()),
                limit: Some(self.config.history_window),
                ..Default::default()
            },
        )
        .await?;

        let user = prompts::user_prompt(&prompts::UserPromptInput {
            phase: updated_session.state.phase,
            frustration: updated_session.state.frustration,
            understanding: updated_session.state.understanding,
            hint_count_in_phase: updated_session.state.hint_count_in_phase,
            recent_history: &history,
            current_code,
            rag_context: &rag_context,
            student_message,
        });

        let options = ChatOptions {
            temperature: 0.7,
            expect_json: false,
            ..Default::default()
        };

        let (raw_reply, degraded) = match self.gateway.chat(&system, &user, options).await {
            Ok(result) => (result.text, false),
            Err(_) => (prompts::canned_fallback(updated_session.state.phase).to_string(), true),
        };

        // Step 7: answer-leakage guard.
        let (mut guarded_reply, fence_lines_used) = guard::apply_leakage_guard(
            &raw_reply,
            self.config.single_fence_hard_cap,
            updated_session.state.fence_budget_remaining,
        );

        // Step 8: hint escalation, enforced regardless of model output.
        let is_hint = prompts::is_hint(&guarded_reply);
        let final_session = self.store.update_session(session_id, |s| {
            s.state.fence_budget_remaining = s.state.fence_budget_remaining.saturating_sub(fence_lines_used);
            if is_hint {
                s.state.hint_count_in_phase += 1;
            }
            Ok(())
        })?;

        if final_session.state.hint_count_in_phase >= self.config.hint_escalation_threshold {
            guarded_reply = format!("{guarded_reply}\n\n{}", prompts::ESCALATION_SUFFIX);
        }

        // Step 9: append and return the TUTOR message.
        let tutor_msg = Message {
            message_id: MessageId::new(),
            session_id: session_id.clone(),
            student_id: session.student_id.clone(),
            activity_id: session.activity_id.clone(),
            sender: Sender::Tutor,
            content: guarded_reply,
            code_snapshot: None,
            error_context: None,
            phase: final_session.state.phase,
            frustration: final_session.state.frustration,
            understanding: final_session.state.understanding,
            timestamp: now(),
        };
        crate::collab::trace::TraceWriter::append_message(self.store.as_ref(), tutor_msg.clone()).await?;

        Ok(TutorReply {
            message: tutor_msg,
            degraded,
        })
    }

    pub async fn history(&self, session_id: &SessionId, limit: Option<usize>) -> Result<Vec<Message>> {
        crate::collab::trace::TraceReader::read_messages(
            self.store.as_ref(),
            crate::collab::trace::TraceQuery {
                session_id: Some(session_id.clone()),
                limit,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn close(&self, session_id: &SessionId, _reason: &str) -> Result<()> {
        self.store.update_session(session_id, |s| {
            s.is_active = false;
            s.ended_at = Some(now());
            Ok(())
        })?;
        Ok(())
    }
}
