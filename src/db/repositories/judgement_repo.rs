//! Judgement repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppResult, models::Judgement};

/// Read access to teacher judgements
pub struct JudgementRepository;

impl JudgementRepository {
    /// Judgement of a submission, if a teacher left one
    pub async fn find_by_submission(
        pool: &PgPool,
        submission_id: &Uuid,
    ) -> AppResult<Option<Judgement>> {
        let judgement =
            sqlx::query_as::<_, Judgement>(r#"SELECT * FROM judgements WHERE submission_id = $1"#)
                .bind(submission_id)
                .fetch_optional(pool)
                .await?;

        Ok(judgement)
    }
}
