//! The catalog writer boundary (§6.4).
//!
//! No teacher or pack file owns a "commit an activity plus exercises"
//! contract directly; this is modeled the way the teacher models any
//! external sink it must not assume succeeds synchronously — an
//! `async_trait` returning `Result<_, CoreError>`, idempotent on a caller-
//! supplied key (here `job_id`), mirroring the idempotency note on
//! `RAGPipeline`'s storage trait in the enrichment pack.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::ids::{ActivityId, CourseId, JobId};

#[derive(Debug, Clone)]
pub struct ActivityHeader {
    pub job_id: JobId,
    pub course_id: CourseId,
    pub topic: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct CatalogExercise {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub mission: String,
    pub starter_code: String,
    pub solution_code: String,
    pub concepts: Vec<String>,
    pub learning_objectives: Vec<String>,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub activity_id: ActivityId,
    pub exercise_ids: Vec<String>,
}

/// Commits an activity header and its exercises in a single transaction.
/// Must be idempotent on `header.job_id`: a retried publish for a job that
/// already has a committed activity returns the same outcome rather than
/// inserting a second time (§6.4, §8 round-trip law).
#[async_trait]
pub trait CatalogWriter: Send + Sync {
    async fn publish(
        &self,
        header: ActivityHeader,
        exercises: Vec<CatalogExercise>,
    ) -> Result<PublishOutcome>;
}

/// In-memory fake keyed by `job_id`, for tests that exercise the
/// approve-and-publish idempotency law without a real catalog service.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct FakeCatalogWriter {
    published: Mutex<HashMap<String, PublishOutcome>>,
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl CatalogWriter for FakeCatalogWriter {
    async fn publish(
        &self,
        header: ActivityHeader,
        exercises: Vec<CatalogExercise>,
    ) -> Result<PublishOutcome> {
        let mut published = self.published.lock().unwrap();
        if let Some(existing) = published.get(header.job_id.as_str()) {
            return Ok(existing.clone());
        }
        let outcome = PublishOutcome {
            activity_id: ActivityId::new(),
            exercise_ids: (0..exercises.len()).map(|i| format!("ex-{i}")).collect(),
        };
        published.insert(header.job_id.as_str().to_string(), outcome.clone());
        Ok(outcome)
    }
}
