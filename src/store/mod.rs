//! X. Trace & Job Store — append-only interaction log, job/session state,
//! audits (§4.X).
//!
//! This is the in-process reference implementation: a thin boundary over
//! what would be a relational store in a deployed system, grounded on the
//! teacher's session-persistence methods (`Memory::create_session`/
//! `update_session`/`get_session`, `src/memory/store_graph.rs`) generalized
//! from one entity (`AgentSession`) to the four this core persists
//! (`Message`, `TutorSession`, `GenerationJob`, `PedagogicalAudit`). Writes
//! are transactional per entity; reads are snapshot-consistent within a
//! single call, both satisfied here by locking a single mutex per table for
//! the duration of the call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::analyst::PedagogicalAudit;
use crate::collab::trace::{TraceQuery, TraceReader, TraceWriter};
use crate::error::{CoreError, Result};
use crate::generator::job::GenerationJob;
use crate::ids::{ActivityId, AuditId, JobId, SessionId};
use crate::tutor::{Message, TutorSession};

#[derive(Default)]
pub struct Store {
    messages: Mutex<Vec<Message>>,
    sessions: Mutex<HashMap<String, TutorSession>>,
    jobs: Mutex<HashMap<String, GenerationJob>>,
    audits: Mutex<HashMap<String, PedagogicalAudit>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, session: TutorSession) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.session_id.as_str().to_string(), session);
        Ok(())
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<TutorSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id.as_str())
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no session {session_id}")))
    }

    /// Applies `f` to the session under lock and persists the result,
    /// giving callers a single critical section per `send` (§5: "each
    /// session is single-threaded").
    pub fn update_session<F>(&self, session_id: &SessionId, f: F) -> Result<TutorSession>
    where
        F: FnOnce(&mut TutorSession) -> Result<()>,
    {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id.as_str())
            .ok_or_else(|| CoreError::not_found(format!("no session {session_id}")))?;
        f(session)?;
        Ok(session.clone())
    }

    pub fn create_job(&self, job: GenerationJob) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.job_id.as_str().to_string(), job);
        Ok(())
    }

    pub fn get_job(&self, job_id: &JobId) -> Result<GenerationJob> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id.as_str())
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no job {job_id}")))
    }

    pub fn update_job<F>(&self, job_id: &JobId, f: F) -> Result<GenerationJob>
    where
        F: FnOnce(&mut GenerationJob) -> Result<()>,
    {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| CoreError::not_found(format!("no job {job_id}")))?;
        f(job)?;
        Ok(job.clone())
    }

    pub fn create_audit(&self, audit: PedagogicalAudit) -> Result<()> {
        let mut audits = self.audits.lock().unwrap();
        audits.insert(audit.analysis_id.as_str().to_string(), audit);
        Ok(())
    }

    pub fn get_audit(&self, audit_id: &AuditId) -> Result<PedagogicalAudit> {
        let audits = self.audits.lock().unwrap();
        audits
            .get(audit_id.as_str())
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("no audit {audit_id}")))
    }
}

#[async_trait]
impl TraceWriter for Store {
    async fn append_message(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        messages.push(message);
        Ok(())
    }
}

#[async_trait]
impl TraceReader for Store {
    async fn read_messages(&self, query: TraceQuery) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        let mut matched: Vec<Message> = messages
            .iter()
            .filter(|m| {
                query
                    .student_id
                    .as_ref()
                    .map(|s| &m.student_id == s)
                    .unwrap_or(true)
                    && query
                        .activity_id
                        .as_ref()
                        .map(|a| &m.activity_id == a)
                        .unwrap_or(true)
                    && query
                        .session_id
                        .as_ref()
                        .map(|s| &m.session_id == s)
                        .unwrap_or(true)
                    && query.since.map(|since| m.timestamp >= since).unwrap_or(true)
            })
            .cloned()
            .collect();

        matched.sort_by_key(|m| m.timestamp);

        if let Some(limit) = query.limit {
            let start = matched.len().saturating_sub(limit);
            matched = matched.split_off(start);
        }

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{now, StudentId};
    use crate::tutor::{CognitiveState, Sender};

    fn sample_message(session_id: SessionId, student_id: StudentId, activity_id: ActivityId) -> Message {
        Message {
            message_id: crate::ids::MessageId::new(),
            session_id,
            student_id,
            activity_id,
            sender: Sender::Student,
            content: "hello".to_string(),
            code_snapshot: None,
            error_context: None,
            phase: crate::tutor::phase::Phase::Exploration,
            frustration: 0.0,
            understanding: 0.5,
            timestamp: now(),
        }
    }

    #[tokio::test]
    async fn messages_are_snapshot_consistent_within_a_call() {
        let store = Store::new();
        let session_id = SessionId::new();
        let student_id = StudentId::new();
        let activity_id = ActivityId::new();

        store
            .append_message(sample_message(session_id.clone(), student_id.clone(), activity_id.clone()))
            .await
            .unwrap();
        store
            .append_message(sample_message(session_id.clone(), student_id.clone(), activity_id.clone()))
            .await
            .unwrap();

        let query = TraceQuery {
            session_id: Some(session_id),
            ..Default::default()
        };
        let messages = store.read_messages(query).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn update_session_persists_mutation() {
        let store = Store::new();
        let session_id = SessionId::new();
        let session = TutorSession {
            session_id: session_id.clone(),
            student_id: StudentId::new(),
            activity_id: ActivityId::new(),
            course_id: crate::ids::CourseId::new(),
            instructions: "do the thing".to_string(),
            expected_concepts: vec![],
            starter_code: String::new(),
            state: CognitiveState::initial(10),
            is_active: true,
            created_at: now(),
            ended_at: None,
        };
        store.create_session(session).unwrap();

        let updated = store
            .update_session(&session_id, |s| {
                s.state.frustration = 0.3;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.state.frustration, 0.3);

        let fetched = store.get_session(&session_id).unwrap();
        assert_eq!(fetched.state.frustration, 0.3);
    }
}
