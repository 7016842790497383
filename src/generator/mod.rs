//! J. Generator Workflow Engine — ingestion, LLM-backed generation, human
//! review, publication (§4.J).

pub mod job;
pub mod prompts;

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::collab::catalog::{ActivityHeader, CatalogExercise, CatalogWriter};
use crate::collab::llm::ChatOptions;
use crate::config::GeneratorConfig;
use crate::error::{CoreError, Result};
use crate::gateway::{recover_json, Gateway};
use crate::ids::JobId;
use crate::rag::RagSubstrate;
use crate::store::Store;

pub use job::{
    DraftExercise, DraftView, Difficulty, GenerationJob, GenerationRequirements, JobPhase, JobSpec, JobStatus,
    PublishResult, TestCase,
};

pub struct GeneratorEngine {
    store: Arc<Store>,
    gateway: Arc<Gateway>,
    rag: Arc<RagSubstrate>,
    catalog: Arc<dyn CatalogWriter>,
    config: GeneratorConfig,
}

impl GeneratorEngine {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<Gateway>,
        rag: Arc<RagSubstrate>,
        catalog: Arc<dyn CatalogWriter>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            rag,
            catalog,
            config,
        }
    }

    /// Enqueues a job and returns immediately; ingestion and generation run
    /// asynchronously on a spawned task (§4.J).
    #[instrument(skip(self, spec))]
    pub async fn start(self: &Arc<Self>, spec: JobSpec) -> Result<JobId> {
        let job_id = JobId::new();
        let collection_key = format!("job-{}", job_id.as_str());
        let job = GenerationJob::new(job_id.clone(), &spec, collection_key);
        self.store.create_job(job)?;

        let engine = Arc::clone(self);
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run_to_awaiting_review(&job_id_for_task, spec).await {
                warn!(job_id = %job_id_for_task, error = %e, "generation job failed");
            }
        });

        Ok(job_id)
    }

    async fn run_to_awaiting_review(&self, job_id: &JobId, spec: JobSpec) -> Result<()> {
        self.store.update_job(job_id, |j| {
            j.phase = JobPhase::Ingesting;
            j.updated_at = crate::ids::now();
            Ok(())
        })?;

        let collection_key = self.store.get_job(job_id)?.collection_key;
        let ingest_result = self
            .rag
            .ingest(&collection_key, &spec.source_id, &spec.source_bytes)
            .await;

        let chunk_count = match ingest_result {
            Ok(outcome) => outcome.chunk_count,
            Err(e) => {
                self.fail_job(job_id, format!("ingestion failed: {e}"))?;
                return Err(e);
            }
        };
        info!(job_id = %job_id, chunk_count, "ingestion complete");

        self.store.update_job(job_id, |j| {
            j.phase = JobPhase::Generating;
            j.updated_at = crate::ids::now();
            Ok(())
        })?;

        let requirements = self.store.get_job(job_id)?.requirements;
        let retrieved = self.gather_excerpts(&collection_key, &requirements, usize::MAX).await;
        let excerpt_block = prompts::build_excerpt_block(&retrieved, retrieved.len());

        let draft = match self.generate_draft(&requirements, &excerpt_block).await {
            Ok(draft) => draft,
            Err(_) => {
                let halved: Vec<(u32, String)> = retrieved
                    .iter()
                    .take(retrieved.len() / 2)
                    .cloned()
                    .collect();
                let halved_block = prompts::build_excerpt_block(&halved, halved.len());
                match self.generate_draft_emphatic(&requirements, &halved_block).await {
                    Ok(draft) => draft,
                    Err(e) => {
                        self.fail_job(job_id, format!("generation failed after retry: {e}"))?;
                        return Err(e);
                    }
                }
            }
        };

        self.store.update_job(job_id, |j| {
            j.draft = draft;
            j.phase = JobPhase::AwaitingReview;
            j.updated_at = crate::ids::now();
            Ok(())
        })?;

        Ok(())
    }

    async fn gather_excerpts(
        &self,
        collection_key: &str,
        requirements: &GenerationRequirements,
        _budget: usize,
    ) -> Vec<(u32, String)> {
        let mut queries = vec![requirements.topic.clone()];
        queries.extend(requirements.concepts.iter().cloned());

        let mut out = Vec::new();
        for query in queries {
            let chunks = self
                .rag
                .query_or_empty(collection_key, &query, self.config.rag_k_per_query)
                .await;
            for chunk in chunks {
                out.push((chunk.metadata.global_ordinal, chunk.text));
            }
        }
        out
    }

    async fn generate_draft(&self, requirements: &GenerationRequirements, excerpt_block: &str) -> Result<Vec<DraftExercise>> {
        self.call_and_parse(requirements, excerpt_block, false).await
    }

    async fn generate_draft_emphatic(
        &self,
        requirements: &GenerationRequirements,
        excerpt_block: &str,
    ) -> Result<Vec<DraftExercise>> {
        self.call_and_parse(requirements, excerpt_block, true).await
    }

    async fn call_and_parse(
        &self,
        requirements: &GenerationRequirements,
        excerpt_block: &str,
        emphatic: bool,
    ) -> Result<Vec<DraftExercise>> {
        let user = prompts::user_prompt(requirements, excerpt_block, emphatic);
        let options = ChatOptions {
            temperature: 0.4,
            expect_json: true,
            max_tokens: 8192,
            ..Default::default()
        };
        let completion = self.gateway.chat(prompts::SYSTEM_PROMPT, &user, options).await?;
        let value = recover_json(
            &completion.text,
            &["title", "difficulty", "mission", "starter_code", "solution_code"],
        )?;
        parse_exercises(&value, requirements.target_count, requirements.difficulty_mix)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        let job = self.store.get_job(job_id)?;
        Ok(JobStatus::from(&job))
    }

    pub async fn draft(&self, job_id: &JobId) -> Result<DraftView> {
        let job = self.store.get_job(job_id)?;
        if matches!(job.phase, JobPhase::Created | JobPhase::Ingesting | JobPhase::Generating) {
            return Err(CoreError::conflict(format!(
                "job {job_id} has no draft yet (phase={:?})",
                job.phase
            )));
        }
        Ok(DraftView {
            exercises: job.draft,
            difficulty_mix: job.requirements.difficulty_mix,
        })
    }

    #[instrument(skip(self, approved_indices))]
    pub async fn approve_and_publish(
        &self,
        job_id: &JobId,
        approved_indices: Option<Vec<usize>>,
    ) -> Result<PublishResult> {
        let job = self.store.get_job(job_id)?;

        if job.phase == JobPhase::Published {
            return Err(CoreError::conflict(format!("job {job_id} is already published")));
        }
        if job.phase != JobPhase::AwaitingReview {
            return Err(CoreError::conflict(format!(
                "job {job_id} is not awaiting review (phase={:?})",
                job.phase
            )));
        }

        let indices = validate_indices(&approved_indices, job.draft.len())?;

        self.store.update_job(job_id, |j| {
            j.phase = JobPhase::Publishing;
            j.updated_at = crate::ids::now();
            Ok(())
        })?;

        let header = ActivityHeader {
            job_id: job_id.clone(),
            course_id: job.course_id.clone(),
            topic: job.requirements.topic.clone(),
            language: job.requirements.language.clone(),
        };

        let exercises: Vec<CatalogExercise> = indices
            .iter()
            .map(|&i| to_catalog_exercise(&job.draft[i]))
            .collect();

        let outcome = match self.catalog.publish(header, exercises).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_job(job_id, format!("publish failed: {e}"))?;
                return Err(e);
            }
        };

        let published_job = self.store.update_job(job_id, |j| {
            j.phase = JobPhase::Published;
            j.approved_indices = Some(indices.clone());
            j.updated_at = crate::ids::now();
            Ok(())
        })?;

        Ok(PublishResult {
            activity_id: outcome.activity_id,
            exercise_ids: outcome.exercise_ids,
            phase: published_job.phase,
        })
    }

    pub async fn cancel(&self, job_id: &JobId) -> Result<()> {
        self.store.update_job(job_id, |j| {
            if !matches!(j.phase, JobPhase::Published | JobPhase::Failed) {
                j.phase = JobPhase::Failed;
                j.error = Some("cancelled".to_string());
                j.updated_at = crate::ids::now();
            }
            Ok(())
        })?;
        Ok(())
    }

    fn fail_job(&self, job_id: &JobId, reason: String) -> Result<()> {
        self.store.update_job(job_id, |j| {
            j.phase = JobPhase::Failed;
            j.error = Some(reason);
            j.updated_at = crate::ids::now();
            Ok(())
        })?;
        Ok(())
    }
}

fn validate_indices(approved_indices: &Option<Vec<usize>>, draft_len: usize) -> Result<Vec<usize>> {
    match approved_indices {
        None => Ok((0..draft_len).collect()),
        Some(indices) => {
            if indices.is_empty() {
                return Err(CoreError::request("approved_indices must not be empty"));
            }
            let mut seen = std::collections::HashSet::new();
            for &i in indices {
                if i >= draft_len || !seen.insert(i) {
                    return Err(CoreError::request(format!(
                        "approved_indices contains an invalid or duplicate index: {i}"
                    )));
                }
            }
            Ok(indices.clone())
        }
    }
}

fn to_catalog_exercise(exercise: &DraftExercise) -> CatalogExercise {
    CatalogExercise {
        title: exercise.title.clone(),
        description: exercise.description.clone(),
        difficulty: match exercise.difficulty {
            Difficulty::Easy => "EASY".to_string(),
            Difficulty::Medium => "MEDIUM".to_string(),
            Difficulty::Hard => "HARD".to_string(),
        },
        mission: exercise.mission.clone(),
        starter_code: exercise.starter_code.clone(),
        solution_code: exercise.solution_code.clone(),
        concepts: exercise.concepts.clone(),
        learning_objectives: exercise.learning_objectives.clone(),
        estimated_minutes: exercise.estimated_minutes,
    }
}

#[derive(Deserialize)]
struct RawExerciseSet {
    exercises: Vec<RawExercise>,
}

#[derive(Deserialize)]
struct RawExercise {
    title: String,
    description: String,
    difficulty: String,
    mission: String,
    starter_code: String,
    solution_code: String,
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    learning_objectives: Vec<String>,
    #[serde(default)]
    test_cases: Vec<RawTestCase>,
    #[serde(default)]
    estimated_minutes: u32,
}

#[derive(Deserialize)]
struct RawTestCase {
    ordinal: u32,
    #[serde(default)]
    description: String,
    input: String,
    expected_output: String,
    #[serde(default)]
    is_hidden: bool,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn parse_exercises(
    value: &serde_json::Value,
    expected_count: usize,
    expected_mix: (usize, usize, usize),
) -> Result<Vec<DraftExercise>> {
    let raw: RawExerciseSet = serde_json::from_value(value.clone())
        .map_err(|e| CoreError::contract(format!("exercise set did not match schema: {e}")))?;

    if raw.exercises.len() != expected_count {
        return Err(CoreError::contract(format!(
            "expected {expected_count} exercises, got {}",
            raw.exercises.len()
        )));
    }

    let exercises: Vec<DraftExercise> = raw
        .exercises
        .into_iter()
        .map(|e| {
            let difficulty = match e.difficulty.to_uppercase().as_str() {
                "EASY" => Difficulty::Easy,
                "MEDIUM" => Difficulty::Medium,
                "HARD" => Difficulty::Hard,
                other => return Err(CoreError::contract(format!("unknown difficulty: {other}"))),
            };

            if e.test_cases.len() < 3 || !e.test_cases.iter().any(|t| t.is_hidden) {
                return Err(CoreError::contract(format!(
                    "exercise '{}' needs >=3 test cases with at least one hidden",
                    e.title
                )));
            }

            Ok(DraftExercise {
                title: e.title,
                description: e.description,
                difficulty,
                mission: e.mission,
                starter_code: e.starter_code,
                solution_code: e.solution_code,
                concepts: e.concepts,
                learning_objectives: e.learning_objectives,
                test_cases: e
                    .test_cases
                    .into_iter()
                    .map(|t| TestCase {
                        ordinal: t.ordinal,
                        description: t.description,
                        input: t.input.into_bytes(),
                        expected_output: t.expected_output.into_bytes(),
                        is_hidden: t.is_hidden,
                        timeout_ms: t.timeout_ms,
                    })
                    .collect(),
                estimated_minutes: e.estimated_minutes,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut mix = (0usize, 0usize, 0usize);
    for e in &exercises {
        match e.difficulty {
            Difficulty::Easy => mix.0 += 1,
            Difficulty::Medium => mix.1 += 1,
            Difficulty::Hard => mix.2 += 1,
        }
    }
    if mix != expected_mix {
        return Err(CoreError::contract(format!(
            "difficulty mix {mix:?} did not match requested mix {expected_mix:?}"
        )));
    }

    Ok(exercises)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::catalog::FakeCatalogWriter;
    use crate::collab::embedder::FakeEmbedder;
    use crate::collab::llm::FakeLlmProvider;
    use crate::collab::pdf::{FakePdfExtractor, PageText};
    use crate::collab::vector_store::InMemoryVectorStore;
    use crate::config::{GatewayConfig, RagConfig};
    use crate::ids::{CourseId, StudentId};

    fn requirements() -> GenerationRequirements {
        GenerationRequirements {
            topic: "for loops".to_string(),
            difficulty_mix: (1, 1, 1),
            language: "python".to_string(),
            concepts: vec!["iteration".to_string()],
            target_count: 3,
            time_estimate_minutes: 30,
        }
    }

    fn raw_exercise_json(count: usize) -> String {
        let exercises: Vec<String> = (0..count)
            .map(|i| {
                let difficulty = match i % 3 {
                    0 => "EASY",
                    1 => "MEDIUM",
                    _ => "HARD",
                };
                format!(
                    r#"{{
                        "title": "Exercise {i}", "description": "desc", "difficulty": "{difficulty}",
                        "mission": "do the thing", "starter_code": "pass", "solution_code": "return 1",
                        "concepts": ["iteration"], "learning_objectives": ["understand loops"],
                        "test_cases": [
                            {{"ordinal": 0, "description": "t0", "input": "1", "expected_output": "1", "is_hidden": false, "timeout_ms": 1000}},
                            {{"ordinal": 1, "description": "t1", "input": "2", "expected_output": "2", "is_hidden": false, "timeout_ms": 1000}},
                            {{"ordinal": 2, "description": "t2", "input": "3", "expected_output": "3", "is_hidden": true, "timeout_ms": 1000}}
                        ],
                        "estimated_minutes": 10
                    }}"#
                )
            })
            .collect();
        format!(r#"{{"exercises": [{}]}}"#, exercises.join(","))
    }

    fn raw_exercise_json_all_easy(count: usize) -> String {
        let exercises: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{
                        "title": "Exercise {i}", "description": "desc", "difficulty": "EASY",
                        "mission": "do the thing", "starter_code": "pass", "solution_code": "return 1",
                        "concepts": ["iteration"], "learning_objectives": ["understand loops"],
                        "test_cases": [
                            {{"ordinal": 0, "description": "t0", "input": "1", "expected_output": "1", "is_hidden": false, "timeout_ms": 1000}},
                            {{"ordinal": 1, "description": "t1", "input": "2", "expected_output": "2", "is_hidden": false, "timeout_ms": 1000}},
                            {{"ordinal": 2, "description": "t2", "input": "3", "expected_output": "3", "is_hidden": true, "timeout_ms": 1000}}
                        ],
                        "estimated_minutes": 10
                    }}"#
                )
            })
            .collect();
        format!(r#"{{"exercises": [{}]}}"#, exercises.join(","))
    }

    fn engine(responses: Vec<Result<String>>) -> (Arc<GeneratorEngine>, Arc<Store>, Arc<FakeCatalogWriter>) {
        let store = Arc::new(Store::new());
        let provider = Arc::new(FakeLlmProvider::new(responses));
        let gateway = Arc::new(Gateway::new(provider, GatewayConfig::default()));
        let rag = Arc::new(RagSubstrate::new(
            Arc::new(FakePdfExtractor {
                pages: vec![PageText {
                    page_number: 1,
                    text: "For loops iterate over sequences in Python.".to_string(),
                }],
                fail: false,
            }),
            Arc::new(FakeEmbedder { dim: 16 }),
            Arc::new(InMemoryVectorStore::default()),
            RagConfig::default(),
        ));
        let catalog = Arc::new(FakeCatalogWriter::default());
        let engine = Arc::new(GeneratorEngine::new(
            store.clone(),
            gateway,
            rag,
            catalog.clone(),
            GeneratorConfig {
                target_count: 3,
                difficulty_mix: (1, 1, 1),
                rag_k_per_query: 2,
            },
        ));
        (engine, store, catalog)
    }

    fn spec() -> JobSpec {
        JobSpec {
            teacher_id: StudentId::new(),
            course_id: CourseId::new(),
            requirements: requirements(),
            source_bytes: b"For loops iterate over sequences in Python.".to_vec(),
            source_id: "lecture.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_awaiting_review_with_correct_mix() {
        let (engine, store, _catalog) = engine(vec![Ok(raw_exercise_json(3))]);
        let job_id = engine.start(spec()).await.unwrap();

        for _ in 0..50 {
            if store.get_job(&job_id).unwrap().phase == JobPhase::AwaitingReview {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let status = engine.status(&job_id).await.unwrap();
        assert_eq!(status.phase, JobPhase::AwaitingReview);

        let draft = engine.draft(&job_id).await.unwrap();
        assert_eq!(draft.exercises.len(), 3);
    }

    #[tokio::test]
    async fn approve_and_publish_rejects_empty_indices() {
        let (engine, store, _catalog) = engine(vec![Ok(raw_exercise_json(3))]);
        let job_id = engine.start(spec()).await.unwrap();
        for _ in 0..50 {
            if store.get_job(&job_id).unwrap().phase == JobPhase::AwaitingReview {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let err = engine
            .approve_and_publish(&job_id, Some(vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Request);
    }

    #[tokio::test]
    async fn publishing_twice_conflicts() {
        let (engine, store, _catalog) = engine(vec![Ok(raw_exercise_json(3))]);
        let job_id = engine.start(spec()).await.unwrap();
        for _ in 0..50 {
            if store.get_job(&job_id).unwrap().phase == JobPhase::AwaitingReview {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        engine.approve_and_publish(&job_id, None).await.unwrap();
        let err = engine.approve_and_publish(&job_id, None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn malformed_json_twice_fails_the_job() {
        let (engine, store, _catalog) = engine(vec![
            Ok("not json at all, no fields either".to_string()),
            Ok("still not valid json or fields".to_string()),
        ]);
        let job_id = engine.start(spec()).await.unwrap();

        for _ in 0..50 {
            let phase = store.get_job(&job_id).unwrap().phase;
            if phase == JobPhase::Failed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let status = engine.status(&job_id).await.unwrap();
        assert_eq!(status.phase, JobPhase::Failed);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn wrong_difficulty_mix_with_correct_count_fails_the_job() {
        let (engine, store, _catalog) = engine(vec![
            Ok(raw_exercise_json_all_easy(3)),
            Ok(raw_exercise_json_all_easy(3)),
        ]);
        let job_id = engine.start(spec()).await.unwrap();

        for _ in 0..50 {
            let phase = store.get_job(&job_id).unwrap().phase;
            if phase == JobPhase::Failed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let status = engine.status(&job_id).await.unwrap();
        assert_eq!(status.phase, JobPhase::Failed);
        assert!(status.error.as_deref().unwrap_or_default().contains("difficulty mix"));
    }

    #[test]
    fn index_validation_rejects_duplicates() {
        let err = validate_indices(&Some(vec![0, 0]), 10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Request);
    }

    #[test]
    fn index_validation_rejects_out_of_range() {
        let err = validate_indices(&Some(vec![10]), 10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Request);
    }

    #[test]
    fn nil_indices_selects_all() {
        let indices = validate_indices(&None, 10).unwrap();
        assert_eq!(indices.len(), 10);
    }
}
