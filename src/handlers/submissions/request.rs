//! Submission request DTOs

use axum::Json;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    services::submission_service::{SubmissionInput, UploadedSource},
};

/// Body of a save, test or submit action.
///
/// An empty body acts on the stored draft. An uploaded file replaces the
/// inline source and filename.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmissionActionRequest {
    pub language_id: Option<Uuid>,

    /// Inline source code
    #[validate(length(max = 1048576))] // 1MB max
    pub source: Option<String>,

    #[validate(length(max = 255))]
    pub filename: Option<String>,

    /// Name of an uploaded source file
    #[validate(length(min = 1, max = 255))]
    pub source_file_name: Option<String>,

    /// Content of an uploaded source file
    pub source_file_base64: Option<String>,
}

impl SubmissionActionRequest {
    /// Decode into coordinator input
    pub fn into_input(self) -> AppResult<SubmissionInput> {
        let upload = match (self.source_file_name, self.source_file_base64) {
            (Some(filename), Some(encoded)) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| {
                        AppError::Validation(format!("Invalid base64 for source file: {}", e))
                    })?;
                let content = String::from_utf8(bytes).map_err(|_| {
                    AppError::Validation("Source file is not valid UTF-8 text".to_string())
                })?;
                Some(UploadedSource { filename, content })
            }
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "Uploaded source needs both a file name and content".to_string(),
                ))
            }
        };

        Ok(SubmissionInput {
            language_id: self.language_id,
            source: self.source,
            filename: self.filename,
            upload,
        })
    }
}

/// Validate an optional action body. No body acts on the stored draft.
pub fn action_input(body: Option<Json<SubmissionActionRequest>>) -> AppResult<SubmissionInput> {
    let Some(Json(payload)) = body else {
        return Ok(SubmissionInput::default());
    };
    payload.validate()?;
    payload.into_input()
}

/// List submissions query parameters
#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub page: Option<u32>,
    pub assignment_id: Option<Uuid>,
    /// Only honoured for teachers and admins
    pub student_id: Option<Uuid>,
}
