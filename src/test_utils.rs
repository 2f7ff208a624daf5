//! Shared test helpers: fixtures, an in-memory store and a sandbox
//! backend that records what it was asked to do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::{Config, DatabaseConfig, JwtConfig, RedisConfig, SandboxConfig, ServerConfig},
    constants::roles,
    db::SubmissionStore,
    error::{AppError, AppResult},
    middleware::auth::AuthenticatedUser,
    models::{
        Assignment, Judgement, Language, NewTestRun, Submission, SubmissionDraft, TestCase,
    },
    runner::{
        CompilationResult, Execution, ExecutionBackend, ProcessBackend, RunnerLimits, Sandbox,
    },
};

pub mod fixtures {
    use super::*;

    /// Id shared by every [`language`] fixture
    pub const SHELL_LANGUAGE_ID: Uuid = Uuid::from_u128(0x5a0c_e000_0000_0000_0000_0000_0000_0001);

    /// POSIX shell; "compilation" is a syntax check
    pub fn language() -> Language {
        Language {
            id: SHELL_LANGUAGE_ID,
            name: "Shell".to_string(),
            extension_src: "sh".to_string(),
            lexer_name: Some("bash".to_string()),
            image: "alpine:3.20".to_string(),
            compile_command: Some("sh -n {srcfile}".to_string()),
            run_command: "sh {srcfile}".to_string(),
            created_at: Utc::now(),
        }
    }

    /// A language that is never allowed by [`assignment`]
    pub fn other_language() -> Language {
        Language {
            id: Uuid::new_v4(),
            name: "Brainfuck".to_string(),
            extension_src: "bf".to_string(),
            lexer_name: None,
            image: "bf:latest".to_string(),
            compile_command: None,
            run_command: "bf {srcfile}".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Test with the default comparison flags
    pub fn test_case(position: i32, input: &str, output: &str, visible: bool) -> TestCase {
        TestCase {
            id: Uuid::new_v4(),
            assignment_id: Uuid::nil(),
            position,
            visible,
            input_type: "stdin".to_string(),
            output_type: "stdout".to_string(),
            input_filename: None,
            output_filename: None,
            input_data: input.to_string(),
            output_data: output.to_string(),
            argv: None,
            timeout_secs: None,
            ignore_case: true,
            ignore_returncode: true,
            comment_prefix: None,
            show_partial_match: true,
            splitlines: false,
            split: false,
            separator: None,
            sort: false,
            parse_int: false,
            parse_float: false,
            float_precision: None,
            created_at: Utc::now(),
        }
    }

    /// Open assignment allowing only the shell language
    pub fn assignment(tests: Vec<TestCase>) -> Assignment {
        let id = Uuid::new_v4();
        Assignment {
            id,
            name: "Answer".to_string(),
            description: None,
            timeout_secs: Some(5.0),
            start_time: None,
            end_time: None,
            created_at: Utc::now(),
            tests: tests
                .into_iter()
                .map(|t| TestCase {
                    assignment_id: id,
                    ..t
                })
                .collect(),
            allowed_languages: vec![language()],
        }
    }

    /// Incomplete shell submission
    pub fn submission(student_id: Uuid, assignment_id: Uuid, source: &str) -> Submission {
        let now = Utc::now();
        Submission {
            id: Uuid::new_v4(),
            student_id,
            assignment_id,
            language_id: SHELL_LANGUAGE_ID,
            source: source.to_string(),
            filename: "solution.sh".to_string(),
            complete: false,
            result: None,
            created_at: now,
            modified_at: now,
            testruns: Vec::new(),
        }
    }

    pub fn judgement(submission_id: Uuid, corrected_source: Option<&str>) -> Judgement {
        Judgement {
            id: Uuid::new_v4(),
            submission_id,
            teacher_id: Uuid::new_v4(),
            corrected_source: corrected_source.map(str::to_string),
            comment: Some("Mind the edge cases".to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn user(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            username: format!("{}-user", role),
            role: role.to_string(),
        }
    }

    pub fn student() -> AuthenticatedUser {
        user(roles::STUDENT)
    }

    pub fn limits() -> RunnerLimits {
        RunnerLimits {
            compile_timeout: Duration::from_secs(10),
            default_test_timeout: Duration::from_secs(5),
        }
    }

    /// Configuration for router tests; nothing in it is dialled
    pub fn config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                rust_log: "debug".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/sauce_test".to_string(),
                max_connections: 1,
            },
            redis: RedisConfig { url: None },
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
            },
            sandbox: SandboxConfig::default(),
        }
    }

    /// Process backend rooted in `dir`
    pub fn process_backend(dir: &std::path::Path) -> ProcessBackend {
        ProcessBackend::new(&SandboxConfig {
            work_root: dir.to_path_buf(),
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct MemoryState {
    assignments: HashMap<Uuid, Assignment>,
    languages: Vec<Language>,
    submissions: HashMap<Uuid, Submission>,
    /// Keyed by submission id
    judgements: HashMap<Uuid, Judgement>,
}

/// In-memory [`SubmissionStore`] with the same conflict rules as Postgres
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    finalize_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.add_language(fixtures::language());
        store
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_language(&self, language: Language) {
        self.state().languages.push(language);
    }

    pub fn add_assignment(&self, assignment: Assignment) {
        self.state().assignments.insert(assignment.id, assignment);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.state().submissions.insert(submission.id, submission);
    }

    pub fn add_judgement(&self, judgement: Judgement) {
        self.state().judgements.insert(judgement.submission_id, judgement);
    }

    pub fn submission(&self, id: Uuid) -> Option<Submission> {
        self.state().submissions.get(&id).cloned()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.values().cloned().collect()
    }

    /// Test runs stored across all submissions
    pub fn testrun_count(&self) -> usize {
        self.state().submissions.values().map(|s| s.testruns.len()).sum()
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn load_assignment(&self, id: Uuid) -> AppResult<Option<Assignment>> {
        Ok(self.state().assignments.get(&id).cloned())
    }

    async fn list_languages(&self) -> AppResult<Vec<Language>> {
        Ok(self.state().languages.clone())
    }

    async fn find_submission(&self, id: Uuid) -> AppResult<Option<Submission>> {
        Ok(self.submission(id))
    }

    async fn find_draft(
        &self,
        student_id: Uuid,
        assignment_id: Uuid,
    ) -> AppResult<Option<Submission>> {
        Ok(self
            .state()
            .submissions
            .values()
            .find(|s| {
                s.student_id == student_id && s.assignment_id == assignment_id && !s.complete
            })
            .cloned())
    }

    async fn find_judgement(&self, submission_id: Uuid) -> AppResult<Option<Judgement>> {
        Ok(self.state().judgements.get(&submission_id).cloned())
    }

    async fn save_draft(&self, draft: &SubmissionDraft) -> AppResult<Submission> {
        let mut state = self.state();
        let now = Utc::now();

        match draft.id {
            Some(id) => {
                let submission = state
                    .submissions
                    .get_mut(&id)
                    .filter(|s| s.student_id == draft.student_id && !s.complete)
                    .ok_or_else(|| {
                        AppError::Conflict("Submission is already complete".to_string())
                    })?;
                submission.language_id = draft.language_id;
                submission.source = draft.source.clone();
                submission.filename = draft.filename.clone();
                submission.modified_at = now;
                Ok(submission.clone())
            }
            None => {
                let exists = state.submissions.values().any(|s| {
                    s.student_id == draft.student_id
                        && s.assignment_id == draft.assignment_id
                        && !s.complete
                });
                if exists {
                    return Err(AppError::Conflict("Resource already exists".to_string()));
                }
                let submission = Submission {
                    id: Uuid::new_v4(),
                    student_id: draft.student_id,
                    assignment_id: draft.assignment_id,
                    language_id: draft.language_id,
                    source: draft.source.clone(),
                    filename: draft.filename.clone(),
                    complete: false,
                    result: None,
                    created_at: now,
                    modified_at: now,
                    testruns: Vec::new(),
                };
                state.submissions.insert(submission.id, submission.clone());
                Ok(submission)
            }
        }
    }

    async fn finalize(
        &self,
        id: Uuid,
        runs: &[NewTestRun],
        result: bool,
    ) -> AppResult<Submission> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        let submission = state
            .submissions
            .get_mut(&id)
            .filter(|s| !s.complete)
            .ok_or_else(|| AppError::Conflict("Submission is already complete".to_string()))?;

        let now = Utc::now();
        submission.complete = true;
        submission.result = Some(result);
        submission.modified_at = now;
        submission.testruns = runs
            .iter()
            .cloned()
            .map(|run| run.into_test_run(id, now))
            .collect();
        Ok(submission.clone())
    }

    async fn delete_draft(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state();
        match state.submissions.get(&id) {
            Some(s) if !s.complete => {
                state.submissions.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_submissions(
        &self,
        student_id: Option<Uuid>,
        assignment_id: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Submission>, i64)> {
        let mut matching: Vec<Submission> = self
            .state()
            .submissions
            .values()
            .filter(|s| student_id.is_none_or(|id| s.student_id == id))
            .filter(|s| assignment_id.is_none_or(|id| s.assignment_id == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

/// What a [`RecordingBackend`] observed
#[derive(Debug, Default)]
pub struct Recording {
    pub acquired: usize,
    pub released: usize,
    pub compiled: usize,
    /// Test ids in execution order
    pub executed: Vec<Uuid>,
}

/// Wraps a real backend and records sandbox usage
pub struct RecordingBackend<B> {
    inner: B,
    recording: Arc<Mutex<Recording>>,
}

impl<B> RecordingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            recording: Arc::new(Mutex::new(Recording::default())),
        }
    }

    pub fn recording(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<B: ExecutionBackend> ExecutionBackend for RecordingBackend<B> {
    async fn acquire(
        &self,
        submission: &Submission,
        language: &Language,
    ) -> AppResult<Box<dyn Sandbox>> {
        let inner = self.inner.acquire(submission, language).await?;
        self.recording().acquired += 1;
        Ok(Box::new(RecordingSandbox {
            inner,
            recording: self.recording.clone(),
        }))
    }
}

struct RecordingSandbox {
    inner: Box<dyn Sandbox>,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingSandbox {
    fn record(&self, f: impl FnOnce(&mut Recording)) {
        f(&mut self.recording.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

#[async_trait]
impl Sandbox for RecordingSandbox {
    async fn compile(&mut self, timeout: Duration) -> AppResult<Option<CompilationResult>> {
        self.record(|r| r.compiled += 1);
        self.inner.compile(timeout).await
    }

    async fn execute(&mut self, test: &TestCase, timeout: Duration) -> AppResult<Execution> {
        let id = test.id;
        self.record(|r| r.executed.push(id));
        self.inner.execute(test, timeout).await
    }

    async fn release(&mut self) -> AppResult<()> {
        self.record(|r| r.released += 1);
        self.inner.release().await
    }
}
