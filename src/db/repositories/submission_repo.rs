//! Submission repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{NewTestRun, Submission, SubmissionDraft, TestRun},
};

/// Repository for submission database operations
pub struct SubmissionRepository;

impl SubmissionRepository {
    /// Find submission by ID, with its test runs
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Submission>> {
        let submission =
            sqlx::query_as::<_, Submission>(r#"SELECT * FROM submissions WHERE id = $1"#)
                .bind(id)
                .fetch_optional(pool)
                .await?;

        let Some(mut submission) = submission else {
            return Ok(None);
        };
        submission.testruns = Self::list_testruns(pool, id).await?;

        Ok(Some(submission))
    }

    /// The open draft of a student for an assignment
    pub async fn find_draft(
        pool: &PgPool,
        student_id: &Uuid,
        assignment_id: &Uuid,
    ) -> AppResult<Option<Submission>> {
        let submission = sqlx::query_as::<_, Submission>(
            r#"
            SELECT * FROM submissions
            WHERE student_id = $1 AND assignment_id = $2 AND complete = FALSE
            "#,
        )
        .bind(student_id)
        .bind(assignment_id)
        .fetch_optional(pool)
        .await?;

        Ok(submission)
    }

    /// Insert a new draft or update an existing incomplete one.
    ///
    /// Updating a submission that has been completed meanwhile is a conflict.
    pub async fn save_draft(pool: &PgPool, draft: &SubmissionDraft) -> AppResult<Submission> {
        let submission = match draft.id {
            Some(id) => sqlx::query_as::<_, Submission>(
                r#"
                UPDATE submissions
                SET language_id = $3, source = $4, filename = $5, modified_at = NOW()
                WHERE id = $1 AND student_id = $2 AND complete = FALSE
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(draft.student_id)
            .bind(draft.language_id)
            .bind(&draft.source)
            .bind(&draft.filename)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::Conflict("Submission is already complete".to_string()))?,
            None => {
                sqlx::query_as::<_, Submission>(
                    r#"
                    INSERT INTO submissions
                        (student_id, assignment_id, language_id, source, filename)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                    "#,
                )
                .bind(draft.student_id)
                .bind(draft.assignment_id)
                .bind(draft.language_id)
                .bind(&draft.source)
                .bind(&draft.filename)
                .fetch_one(pool)
                .await?
            }
        };

        Ok(submission)
    }

    /// Mark a submission complete and append its test runs in one transaction.
    ///
    /// The update only matches while `complete` is still false, so a second
    /// finalisation of the same submission rolls back with a conflict.
    pub async fn finalize(
        pool: &PgPool,
        id: &Uuid,
        runs: &[NewTestRun],
        result: bool,
    ) -> AppResult<Submission> {
        let mut tx = pool.begin().await?;

        let submission = sqlx::query_as::<_, Submission>(
            r#"
            UPDATE submissions
            SET complete = TRUE, result = $2, modified_at = NOW()
            WHERE id = $1 AND complete = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(result)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut submission) = submission else {
            tx.rollback().await?;
            return Err(AppError::Conflict("Submission is already complete".to_string()));
        };

        let mut testruns = Vec::with_capacity(runs.len());
        for run in runs {
            let testrun = sqlx::query_as::<_, TestRun>(
                r#"
                INSERT INTO testruns (
                    submission_id, test_id, runtime_secs, result, partial,
                    timed_out, returncode, output_data, error_data
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(run.test_id)
            .bind(run.runtime_secs)
            .bind(run.result)
            .bind(run.partial)
            .bind(run.timed_out)
            .bind(run.returncode)
            .bind(&run.output_data)
            .bind(&run.error_data)
            .fetch_one(&mut *tx)
            .await?;
            testruns.push(testrun);
        }

        tx.commit().await?;

        submission.testruns = testruns;
        Ok(submission)
    }

    /// Delete an incomplete submission. Returns false if nothing was deleted.
    pub async fn delete_draft(pool: &PgPool, id: &Uuid) -> AppResult<bool> {
        let result = sqlx::query(r#"DELETE FROM submissions WHERE id = $1 AND complete = FALSE"#)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Test runs of a submission in test order
    pub async fn list_testruns(pool: &PgPool, submission_id: &Uuid) -> AppResult<Vec<TestRun>> {
        let testruns = sqlx::query_as::<_, TestRun>(
            r#"
            SELECT tr.*
            FROM testruns tr
            JOIN tests t ON t.id = tr.test_id
            WHERE tr.submission_id = $1
            ORDER BY t.position, tr.created_at
            "#,
        )
        .bind(submission_id)
        .fetch_all(pool)
        .await?;

        Ok(testruns)
    }

    /// List submissions with pagination, newest first
    pub async fn list(
        pool: &PgPool,
        offset: i64,
        limit: i64,
        student_id: Option<&Uuid>,
        assignment_id: Option<&Uuid>,
    ) -> AppResult<(Vec<Submission>, i64)> {
        let submissions = sqlx::query_as::<_, Submission>(
            r#"
            SELECT * FROM submissions
            WHERE
                ($1::uuid IS NULL OR student_id = $1)
                AND ($2::uuid IS NULL OR assignment_id = $2)
            ORDER BY created_at DESC
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(student_id)
        .bind(assignment_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM submissions
            WHERE
                ($1::uuid IS NULL OR student_id = $1)
                AND ($2::uuid IS NULL OR assignment_id = $2)
            "#,
        )
        .bind(student_id)
        .bind(assignment_id)
        .fetch_one(pool)
        .await?;

        Ok((submissions, count))
    }
}
