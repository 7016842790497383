//! The trace reader/writer boundary (§6.5).
//!
//! Split into a reader and a writer trait even though the reference
//! implementation (`crate::store`) satisfies both, because the Analyst
//! (§4.A) only ever needs read access — grounded on the teacher's habit of
//! keeping `MemoryStore`'s query surface (`recall`, `search_library`)
//! separate in spirit from its write surface (`store`, `register_skill`)
//! even though both live on one trait there; here the separation is made
//! explicit since two different components (T writes, A only reads) use it.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{ActivityId, SessionId, StudentId};
use crate::tutor::Message;

#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    pub student_id: Option<StudentId>,
    pub activity_id: Option<ActivityId>,
    pub session_id: Option<SessionId>,
    pub limit: Option<usize>,
    pub since: Option<crate::ids::Timestamp>,
}

/// Snapshot-consistent within a single call, per §4.X.
#[async_trait]
pub trait TraceReader: Send + Sync {
    async fn read_messages(&self, query: TraceQuery) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait TraceWriter: Send + Sync {
    async fn append_message(&self, message: Message) -> Result<()>;
}
