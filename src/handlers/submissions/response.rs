//! Submission response DTOs

use chrono::{DateTime, Utc};
use serde::Serialize;
use similar::TextDiff;
use uuid::Uuid;

use crate::{
    models::{Judgement, LanguageSummary, Submission, SubmissionState, TestCase, TestRun},
    runner::TestRunResult,
};

/// Submission without its test runs
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assignment_id: Uuid,
    pub language_id: Uuid,
    pub filename: String,
    pub state: SubmissionState,
    pub complete: bool,
    pub result: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<&Submission> for SubmissionSummary {
    fn from(s: &Submission) -> Self {
        Self {
            id: s.id,
            student_id: s.student_id,
            assignment_id: s.assignment_id,
            language_id: s.language_id,
            filename: s.filename.clone(),
            state: s.state(),
            complete: s.complete,
            result: s.result,
            created_at: s.created_at,
            modified_at: s.modified_at,
        }
    }
}

/// One test outcome as shown to a caller.
///
/// Output fields are `None` when the caller may not see them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestRunView {
    pub test_id: Uuid,
    pub position: Option<i32>,
    pub visible: bool,
    pub passed: bool,
    pub partial: bool,
    pub timed_out: bool,
    pub returncode: Option<i32>,
    pub runtime_secs: f64,
    pub output_data: Option<String>,
    pub error_data: Option<String>,
    pub expected_output: Option<String>,
}

impl TestRunView {
    /// View of an ephemeral result
    pub fn from_result(
        result: &TestRunResult,
        test: Option<&TestCase>,
        reveal_hidden: bool,
    ) -> Self {
        let shown = result.visible || reveal_hidden;
        Self {
            test_id: result.test_id,
            position: test.map(|t| t.position),
            visible: result.visible,
            passed: result.passed,
            partial: result.partial,
            timed_out: result.timed_out,
            returncode: result.returncode,
            runtime_secs: result.runtime_secs,
            output_data: shown.then(|| result.output_data.clone()),
            error_data: shown.then(|| result.error_data.clone()),
            expected_output: test.filter(|_| shown).map(|t| t.output_data.clone()),
        }
    }

    /// View of a persisted run. Runs of unknown tests count as hidden.
    pub fn from_run(run: &TestRun, test: Option<&TestCase>, reveal_hidden: bool) -> Self {
        let visible = test.is_some_and(|t| t.visible);
        let shown = visible || reveal_hidden;
        Self {
            test_id: run.test_id,
            position: test.map(|t| t.position),
            visible,
            passed: run.result,
            partial: run.partial,
            timed_out: run.timed_out,
            returncode: run.returncode,
            runtime_secs: run.runtime_secs,
            output_data: run.output_data.clone().filter(|_| shown),
            error_data: run.error_data.clone().filter(|_| shown),
            expected_output: test.filter(|_| shown).map(|t| t.output_data.clone()),
        }
    }
}

/// Teacher feedback shown with a submission
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JudgementView {
    pub comment: Option<String>,
    pub corrected_source: Option<String>,
    /// Unified diff from the submitted to the corrected source
    pub diff: Option<String>,
}

impl JudgementView {
    pub fn new(judgement: &Judgement, source: &str) -> Self {
        let corrected = judgement
            .corrected_source
            .as_deref()
            .filter(|s| !s.is_empty());
        Self {
            comment: judgement.comment.clone(),
            corrected_source: corrected.map(str::to_string),
            diff: corrected.map(|corrected| unified_diff(source, corrected)),
        }
    }
}

fn unified_diff(source: &str, corrected: &str) -> String {
    TextDiff::from_lines(source, corrected)
        .unified_diff()
        .header("your source", "corrected source")
        .to_string()
}

/// Permanent read view of a submission
#[derive(Debug, Serialize)]
pub struct SubmissionView {
    #[serde(flatten)]
    pub submission: SubmissionSummary,
    pub assignment_name: String,
    pub language: Option<LanguageSummary>,
    pub source: String,
    /// Incomplete and the assignment is still open
    pub editable: bool,
    pub testruns: Vec<TestRunView>,
    pub judgement: Option<JudgementView>,
}

/// The caller's working state for an assignment
#[derive(Debug, Serialize)]
pub struct DraftView {
    pub assignment_id: Uuid,
    pub assignment_name: String,
    pub state: SubmissionState,
    pub editable: bool,
    pub allowed_languages: Vec<LanguageSummary>,
    pub submission: Option<SubmissionSummary>,
    pub source: Option<String>,
    /// Where the submission should be opened: edit while open, else read view
    pub location: Option<String>,
}

/// Submission list response
#[derive(Debug, Serialize)]
pub struct SubmissionsListResponse {
    pub submissions: Vec<SubmissionSummary>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
