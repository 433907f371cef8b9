use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, ReviewsRepo},
    domain::{entities::ReviewRecord, types::Locale},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    locale: Locale,
    author: String,
    rating: i16,
    body: String,
    created_at: OffsetDateTime,
}

impl From<ReviewRow> for ReviewRecord {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            locale: row.locale,
            author: row.author,
            rating: row.rating,
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ReviewsRepo for PostgresRepositories {
    async fn list_published(&self, locale: Locale) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, locale, author, rating, body, created_at FROM reviews \
             WHERE locale = $1 AND is_published \
             ORDER BY created_at DESC",
        )
        .bind(locale)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReviewRecord::from).collect())
    }
}
