//! Execution collaborator
//!
//! A [`Runner`] owns one sandbox for the duration of a single submission
//! action. It compiles the submission, runs tests and judges their output.
//! Sandboxes come from an [`ExecutionBackend`]:
//!
//! - **Docker** (`container.rs`): one throwaway container per action.
//! - **Process** (`process.rs`): a temporary directory and local processes.
//!
//! Callers must call [`Runner::release`] on every exit path; both sandboxes
//! additionally clean up on drop.

pub mod command;
pub mod compare;
pub mod container;
pub mod process;
pub mod visibility;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Assignment, Language, NewTestRun, Submission, TestCase},
};

pub use container::DockerBackend;
pub use process::ProcessBackend;
pub use visibility::{all_passed, eligible_tests, EvaluationAction};

/// Outcome of the compilation step
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompilationResult {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub runtime_secs: f64,
    pub timed_out: bool,
}

impl CompilationResult {
    pub fn succeeded(&self) -> bool {
        self.returncode == 0 && !self.timed_out
    }
}

/// Raw outcome of running the program once against a test
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// `None` when the process was killed
    pub returncode: Option<i32>,
    /// Output to judge: stdout or the test's output file
    pub output: String,
    pub stderr: String,
    pub runtime_secs: f64,
    pub timed_out: bool,
}

/// Judged outcome of one test
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestRunResult {
    pub test_id: Uuid,
    pub visible: bool,
    pub returncode: Option<i32>,
    pub output_data: String,
    pub error_data: String,
    pub runtime_secs: f64,
    pub passed: bool,
    /// Soft pass shown to the student; never counts for gating
    pub partial: bool,
    pub timed_out: bool,
}

impl TestRunResult {
    /// Record to persist for this result
    pub fn to_new_test_run(&self) -> NewTestRun {
        NewTestRun {
            test_id: self.test_id,
            runtime_secs: self.runtime_secs,
            result: self.passed,
            partial: self.partial,
            timed_out: self.timed_out,
            returncode: self.returncode,
            output_data: Some(self.output_data.clone()),
            error_data: Some(self.error_data.clone()),
        }
    }
}

/// Isolated working area for one submission
#[async_trait]
pub trait Sandbox: Send {
    /// Run the language's compile command. `None` if the language is interpreted.
    async fn compile(&mut self, timeout: Duration) -> AppResult<Option<CompilationResult>>;

    /// Run the program against one test, killing it after `timeout`
    async fn execute(&mut self, test: &TestCase, timeout: Duration) -> AppResult<Execution>;

    /// Tear down files and processes. Must be idempotent.
    async fn release(&mut self) -> AppResult<()>;
}

/// Source of sandboxes
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Create a sandbox holding the submission's source
    async fn acquire(
        &self,
        submission: &Submission,
        language: &Language,
    ) -> AppResult<Box<dyn Sandbox>>;
}

/// Time bounds applied by a [`Runner`]
#[derive(Debug, Clone, Copy)]
pub struct RunnerLimits {
    pub compile_timeout: Duration,
    pub default_test_timeout: Duration,
}

/// Scoped compile/test session for one submission
pub struct Runner {
    sandbox: Box<dyn Sandbox>,
    limits: RunnerLimits,
    submission_id: Uuid,
    released: bool,
}

impl Runner {
    /// Acquire a sandbox for `submission`
    pub async fn acquire(
        backend: &dyn ExecutionBackend,
        submission: &Submission,
        language: &Language,
        limits: RunnerLimits,
    ) -> AppResult<Self> {
        let sandbox = backend.acquire(submission, language).await?;
        tracing::debug!(
            submission_id = %submission.id,
            language = %language.name,
            "Sandbox acquired"
        );

        Ok(Self {
            sandbox,
            limits,
            submission_id: submission.id,
            released: false,
        })
    }

    /// Compile the submission; `None` for interpreted languages
    pub async fn compile(&mut self) -> AppResult<Option<CompilationResult>> {
        let compilation = self.sandbox.compile(self.limits.compile_timeout).await?;

        if let Some(result) = &compilation {
            tracing::info!(
                submission_id = %self.submission_id,
                returncode = result.returncode,
                timed_out = result.timed_out,
                runtime_secs = result.runtime_secs,
                "Compilation finished"
            );
        }

        Ok(compilation)
    }

    /// Run and judge a single test
    pub async fn run(
        &mut self,
        assignment: &Assignment,
        test: &TestCase,
    ) -> AppResult<TestRunResult> {
        let timeout = assignment.timeout_for(test, self.limits.default_test_timeout);
        let execution = self.sandbox.execute(test, timeout).await?;
        let judgement = compare::judge(test, &execution);

        tracing::debug!(
            submission_id = %self.submission_id,
            test_id = %test.id,
            passed = judgement.passed,
            partial = judgement.partial,
            timed_out = execution.timed_out,
            "Test finished"
        );

        Ok(TestRunResult {
            test_id: test.id,
            visible: test.visible,
            returncode: execution.returncode,
            output_data: execution.output,
            error_data: execution.stderr,
            runtime_secs: execution.runtime_secs,
            passed: judgement.passed,
            partial: judgement.partial,
            timed_out: execution.timed_out,
        })
    }

    /// Run tests in the given order
    pub async fn run_all(
        &mut self,
        assignment: &Assignment,
        tests: &[&TestCase],
    ) -> AppResult<Vec<TestRunResult>> {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            results.push(self.run(assignment, test).await?);
        }
        Ok(results)
    }

    /// Run the tests students may see before final submission
    pub async fn test_visible(&mut self, assignment: &Assignment) -> AppResult<Vec<TestRunResult>> {
        let tests = eligible_tests(&assignment.tests, EvaluationAction::Test);
        self.run_all(assignment, &tests).await
    }

    /// Run every test of the assignment
    pub async fn test(&mut self, assignment: &Assignment) -> AppResult<Vec<TestRunResult>> {
        let tests = eligible_tests(&assignment.tests, EvaluationAction::Submit);
        self.run_all(assignment, &tests).await
    }

    /// Tear down the sandbox. Safe to call more than once.
    pub async fn release(&mut self) -> AppResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.sandbox.release().await?;
        tracing::debug!(submission_id = %self.submission_id, "Sandbox released");
        Ok(())
    }
}

/// Total runtime of a batch of results
pub fn total_runtime(results: &[TestRunResult]) -> f64 {
    results.iter().map(|r| r.runtime_secs).sum()
}

/// Decode captured bytes, keeping at most `limit` bytes.
///
/// NUL bytes become U+FFFD: postgres text columns cannot store them.
pub fn truncate_output(bytes: &[u8], limit: usize) -> String {
    let kept = &bytes[..bytes.len().min(limit)];
    let mut text = String::from_utf8_lossy(kept).replace('\0', "\u{FFFD}");
    if bytes.len() > limit {
        text.push_str("\n[output truncated]");
    }
    text
}
