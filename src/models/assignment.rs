//! Assignment model

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Language, TestCase};

/// Assignment database model
///
/// `tests` and `allowed_languages` are loaded separately by the repository;
/// tests are kept in their stable evaluation order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Default timeout for tests that don't set their own
    pub timeout_secs: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub tests: Vec<TestCase>,
    #[sqlx(skip)]
    #[serde(default)]
    pub allowed_languages: Vec<Language>,
}

impl Assignment {
    /// Whether the submission window is currently open
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Whether the submission window is open at `now`. Missing bounds are open-ended.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.is_none_or(|start| start <= now);
        let not_ended = self.end_time.is_none_or(|end| now <= end);
        started && not_ended
    }

    /// Look up an allowed language by id
    pub fn allowed_language(&self, language_id: &Uuid) -> Option<&Language> {
        self.allowed_languages.iter().find(|l| &l.id == language_id)
    }

    /// Effective timeout for a test: the test's own value, else the
    /// assignment's, else `fallback`. Unusable values fall through to the
    /// next source instead of shadowing it.
    pub fn timeout_for(&self, test: &TestCase, fallback: Duration) -> Duration {
        let usable = |secs: Option<f64>| {
            secs.filter(|secs| secs.is_finite() && *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        };
        usable(test.timeout_secs)
            .or_else(|| usable(self.timeout_secs))
            .unwrap_or(fallback)
    }
}
