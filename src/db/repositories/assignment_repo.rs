//! Assignment repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Assignment, Language, TestCase},
};

/// Repository for assignments, their tests and allowed languages
pub struct AssignmentRepository;

impl AssignmentRepository {
    /// Find an assignment with its tests and allowed languages
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, name, description, timeout_secs, start_time, end_time, created_at
            FROM assignments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some(mut assignment) = assignment else {
            return Ok(None);
        };

        assignment.tests = Self::list_tests(pool, id).await?;
        assignment.allowed_languages = Self::list_allowed_languages(pool, id).await?;

        Ok(Some(assignment))
    }

    /// Tests of an assignment in evaluation order
    pub async fn list_tests(pool: &PgPool, assignment_id: &Uuid) -> AppResult<Vec<TestCase>> {
        let tests = sqlx::query_as::<_, TestCase>(
            r#"SELECT * FROM tests WHERE assignment_id = $1 ORDER BY position, id"#,
        )
        .bind(assignment_id)
        .fetch_all(pool)
        .await?;

        Ok(tests)
    }

    pub async fn list_allowed_languages(
        pool: &PgPool,
        assignment_id: &Uuid,
    ) -> AppResult<Vec<Language>> {
        let languages = sqlx::query_as::<_, Language>(
            r#"
            SELECT l.*
            FROM languages l
            JOIN assignment_languages al ON al.language_id = l.id
            WHERE al.assignment_id = $1
            ORDER BY l.name
            "#,
        )
        .bind(assignment_id)
        .fetch_all(pool)
        .await?;

        Ok(languages)
    }
}
