//! Language repository

use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppResult, models::Language};

/// Repository for language database operations
pub struct LanguageRepository;

impl LanguageRepository {
    /// Find language by ID
    pub async fn find_by_id(pool: &PgPool, id: &Uuid) -> AppResult<Option<Language>> {
        let language = sqlx::query_as::<_, Language>(r#"SELECT * FROM languages WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(language)
    }

    /// List all languages by name
    pub async fn list(pool: &PgPool) -> AppResult<Vec<Language>> {
        let languages = sqlx::query_as::<_, Language>(r#"SELECT * FROM languages ORDER BY name"#)
            .fetch_all(pool)
            .await?;

        Ok(languages)
    }
}
