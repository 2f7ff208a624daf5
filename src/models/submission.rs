//! Submission model

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Assignment, TestCase, TestRun};

/// Submission database model
///
/// `complete` flips from false to true exactly once, when the submission is
/// graded. After that source, language, filename and test runs are frozen.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assignment_id: Uuid,
    pub language_id: Uuid,
    pub source: String,
    pub filename: String,
    pub complete: bool,
    /// Stored at finalisation; `None` while incomplete
    pub result: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub testruns: Vec<TestRun>,
}

/// Lifecycle state of a student's submission for an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    /// No record or no source yet
    Empty,
    /// Source present, not graded
    Draft,
    /// Graded; terminal
    Complete,
}

impl SubmissionState {
    /// State of an optional submission record
    pub fn of(submission: Option<&Submission>) -> Self {
        match submission {
            None => Self::Empty,
            Some(s) if s.complete => Self::Complete,
            Some(s) if s.source.trim().is_empty() => Self::Empty,
            Some(_) => Self::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Draft => "draft",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Submission {
    pub fn state(&self) -> SubmissionState {
        SubmissionState::of(Some(self))
    }

    /// Whether the owning student may still change or test this submission
    pub fn is_editable(&self, assignment: &Assignment) -> bool {
        !self.complete && assignment.is_active()
    }

    /// Aggregate result computed from the test runs.
    ///
    /// Undefined while incomplete or while any test of the assignment lacks
    /// a run; otherwise true iff every run passed.
    pub fn derive_result(&self, tests: &[TestCase]) -> Option<bool> {
        if !self.complete {
            return None;
        }

        let covered: HashSet<Uuid> = self.testruns.iter().map(|run| run.test_id).collect();
        if tests.iter().any(|test| !covered.contains(&test.id)) {
            return None;
        }

        Some(self.testruns.iter().all(|run| run.result))
    }
}

/// Validated source ready to be written to a draft
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionDraft {
    /// Existing draft to update, `None` to create one
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub assignment_id: Uuid,
    pub language_id: Uuid,
    pub source: String,
    pub filename: String,
}
