//! Test run model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted outcome of one test against one submission
///
/// Rows are only written when a submission is finalised; they are never
/// updated afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct TestRun {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub test_id: Uuid,
    pub runtime_secs: f64,
    pub result: bool,
    pub partial: bool,
    pub timed_out: bool,
    pub returncode: Option<i32>,
    pub output_data: Option<String>,
    pub error_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Test run awaiting insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewTestRun {
    pub test_id: Uuid,
    pub runtime_secs: f64,
    pub result: bool,
    pub partial: bool,
    pub timed_out: bool,
    pub returncode: Option<i32>,
    pub output_data: Option<String>,
    pub error_data: Option<String>,
}

impl NewTestRun {
    /// Materialise into a row owned by `submission_id`
    pub fn into_test_run(self, submission_id: Uuid, created_at: DateTime<Utc>) -> TestRun {
        TestRun {
            id: Uuid::new_v4(),
            submission_id,
            test_id: self.test_id,
            runtime_secs: self.runtime_secs,
            result: self.result,
            partial: self.partial,
            timed_out: self.timed_out,
            returncode: self.returncode,
            output_data: self.output_data,
            error_data: self.error_data,
            created_at,
        }
    }
}
