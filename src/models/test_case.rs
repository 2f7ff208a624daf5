//! Test case model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::constants::{
    input_types, output_types, DEFAULT_INPUT_FILENAME, DEFAULT_OUTPUT_FILENAME,
};

/// One fixed test case of an assignment
///
/// The comparison flags describe how expected and actual output are
/// normalised before they are compared, see [`crate::runner::compare`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub assignment_id: Uuid,
    /// Stable evaluation order within the assignment
    pub position: i32,
    /// Whether students see this test's outcome before final submission
    pub visible: bool,

    pub input_type: String,
    pub output_type: String,
    pub input_filename: Option<String>,
    pub output_filename: Option<String>,
    pub input_data: String,
    pub output_data: String,
    /// Command line arguments; may reference `{path}`, `{infile}`, `{outfile}`
    pub argv: Option<String>,
    /// Overrides the assignment timeout
    pub timeout_secs: Option<f64>,

    pub ignore_case: bool,
    pub ignore_returncode: bool,
    pub comment_prefix: Option<String>,
    pub show_partial_match: bool,
    pub splitlines: bool,
    pub split: bool,
    pub separator: Option<String>,
    pub sort: bool,
    pub parse_int: bool,
    pub parse_float: bool,
    pub float_precision: Option<i32>,

    pub created_at: DateTime<Utc>,
}

impl TestCase {
    /// Input is written to a file instead of stdin
    pub fn reads_file(&self) -> bool {
        self.input_type == input_types::FILE
    }

    /// Output is collected from a file instead of stdout
    pub fn writes_file(&self) -> bool {
        self.output_type == output_types::FILE
    }

    pub fn input_file(&self) -> &str {
        self.input_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_INPUT_FILENAME)
    }

    pub fn output_file(&self) -> &str {
        self.output_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_OUTPUT_FILENAME)
    }
}
