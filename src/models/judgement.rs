//! Judgement model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A teacher's verdict on one submission
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Judgement {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub teacher_id: Uuid,
    pub corrected_source: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
