//! Persistence boundary of the submission lifecycle
//!
//! The coordinator only talks to [`SubmissionStore`]. [`PgStore`] backs it
//! with the Postgres repositories; tests use a mock or an in-memory store.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repositories::{
    AssignmentRepository, JudgementRepository, LanguageRepository, SubmissionRepository,
};
use crate::{
    error::AppResult,
    models::{Assignment, Judgement, Language, NewTestRun, Submission, SubmissionDraft},
};

/// Transactional store for assignments and submissions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Assignment with tests (in evaluation order) and allowed languages
    async fn load_assignment(&self, id: Uuid) -> AppResult<Option<Assignment>>;

    async fn list_languages(&self) -> AppResult<Vec<Language>>;

    /// Submission with its test runs
    async fn find_submission(&self, id: Uuid) -> AppResult<Option<Submission>>;

    /// The student's open draft for an assignment
    async fn find_draft(
        &self,
        student_id: Uuid,
        assignment_id: Uuid,
    ) -> AppResult<Option<Submission>>;

    /// Teacher feedback on a submission. Read-only here.
    async fn find_judgement(&self, submission_id: Uuid) -> AppResult<Option<Judgement>>;

    /// Create or update a draft. Fails with `Conflict` if it was completed meanwhile.
    async fn save_draft(&self, draft: &SubmissionDraft) -> AppResult<Submission>;

    /// Atomically set `complete`, store `result` and append the test runs.
    /// Fails with `Conflict` and changes nothing if already complete.
    async fn finalize(
        &self,
        id: Uuid,
        runs: &[NewTestRun],
        result: bool,
    ) -> AppResult<Submission>;

    /// Delete an incomplete submission; false if nothing matched
    async fn delete_draft(&self, id: Uuid) -> AppResult<bool>;

    /// Page of submissions, newest first, and the total count
    async fn list_submissions(
        &self,
        student_id: Option<Uuid>,
        assignment_id: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Submission>, i64)>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn load_assignment(&self, id: Uuid) -> AppResult<Option<Assignment>> {
        AssignmentRepository::find_by_id(&self.pool, &id).await
    }

    async fn list_languages(&self) -> AppResult<Vec<Language>> {
        LanguageRepository::list(&self.pool).await
    }

    async fn find_submission(&self, id: Uuid) -> AppResult<Option<Submission>> {
        SubmissionRepository::find_by_id(&self.pool, &id).await
    }

    async fn find_draft(
        &self,
        student_id: Uuid,
        assignment_id: Uuid,
    ) -> AppResult<Option<Submission>> {
        SubmissionRepository::find_draft(&self.pool, &student_id, &assignment_id).await
    }

    async fn find_judgement(&self, submission_id: Uuid) -> AppResult<Option<Judgement>> {
        JudgementRepository::find_by_submission(&self.pool, &submission_id).await
    }

    async fn save_draft(&self, draft: &SubmissionDraft) -> AppResult<Submission> {
        SubmissionRepository::save_draft(&self.pool, draft).await
    }

    async fn finalize(
        &self,
        id: Uuid,
        runs: &[NewTestRun],
        result: bool,
    ) -> AppResult<Submission> {
        SubmissionRepository::finalize(&self.pool, &id, runs, result).await
    }

    async fn delete_draft(&self, id: Uuid) -> AppResult<bool> {
        SubmissionRepository::delete_draft(&self.pool, &id).await
    }

    async fn list_submissions(
        &self,
        student_id: Option<Uuid>,
        assignment_id: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<Submission>, i64)> {
        SubmissionRepository::list(
            &self.pool,
            offset,
            limit,
            student_id.as_ref(),
            assignment_id.as_ref(),
        )
        .await
    }
}
