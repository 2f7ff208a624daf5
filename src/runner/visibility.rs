//! Test visibility filter

use serde::{Deserialize, Serialize};

use super::TestRunResult;
use crate::models::TestCase;

/// What the student asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationAction {
    /// Non-final check against visible tests
    Test,
    /// Final, graded run against every test
    Submit,
}

impl EvaluationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Submit => "submit",
        }
    }
}

impl std::fmt::Display for EvaluationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tests eligible for `action`, in evaluation order.
///
/// Hidden tests are only ever eligible for [`EvaluationAction::Submit`].
/// An empty result means the gate passes vacuously.
pub fn eligible_tests(tests: &[TestCase], action: EvaluationAction) -> Vec<&TestCase> {
    let mut selected: Vec<&TestCase> = tests
        .iter()
        .filter(|test| action == EvaluationAction::Submit || test.visible)
        .collect();
    selected.sort_by_key(|test| test.position);
    selected
}

/// Whether every result passed; true for an empty batch.
/// Partial matches do not count.
pub fn all_passed(results: &[TestRunResult]) -> bool {
    results.iter().all(|r| r.passed)
}
