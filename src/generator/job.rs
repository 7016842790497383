//! The `GenerationJob` state machine and its data model (§3.1, §4.J).

use serde::{Deserialize, Serialize};

use crate::ids::{CourseId, JobId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Created,
    Ingesting,
    Generating,
    AwaitingReview,
    Publishing,
    Published,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub ordinal: u32,
    pub description: String,
    pub input: Vec<u8>,
    pub expected_output: Vec<u8>,
    pub is_hidden: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftExercise {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub mission: String,
    pub starter_code: String,
    pub solution_code: String,
    pub concepts: Vec<String>,
    pub learning_objectives: Vec<String>,
    pub test_cases: Vec<TestCase>,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequirements {
    pub topic: String,
    pub difficulty_mix: (usize, usize, usize),
    pub language: String,
    pub concepts: Vec<String>,
    pub target_count: usize,
    pub time_estimate_minutes: u32,
}

#[derive(Debug, Clone)]
pub struct JobSpec {
    pub teacher_id: crate::ids::StudentId,
    pub course_id: CourseId,
    pub requirements: GenerationRequirements,
    pub source_bytes: Vec<u8>,
    pub source_id: String,
}

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub job_id: JobId,
    pub teacher_id: crate::ids::StudentId,
    pub course_id: CourseId,
    pub requirements: GenerationRequirements,
    pub collection_key: String,
    pub phase: JobPhase,
    pub draft: Vec<DraftExercise>,
    pub error: Option<String>,
    pub approved_indices: Option<Vec<usize>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationJob {
    pub fn new(job_id: JobId, spec: &JobSpec, collection_key: String) -> Self {
        let now = crate::ids::now();
        Self {
            job_id,
            teacher_id: spec.teacher_id.clone(),
            course_id: spec.course_id.clone(),
            requirements: spec.requirements.clone(),
            collection_key,
            phase: JobPhase::Created,
            draft: Vec::new(),
            error: None,
            approved_indices: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: JobId,
    pub phase: JobPhase,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub error: Option<String>,
    pub draft_ready: bool,
}

impl From<&GenerationJob> for JobStatus {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            phase: job.phase,
            created_at: job.created_at,
            updated_at: job.updated_at,
            error: job.error.clone(),
            draft_ready: !job.draft.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftView {
    pub exercises: Vec<DraftExercise>,
    pub difficulty_mix: (usize, usize, usize),
}

#[derive(Debug, Clone)]
pub struct PublishResult {
    pub activity_id: crate::ids::ActivityId,
    pub exercise_ids: Vec<String>,
    pub phase: JobPhase,
}
