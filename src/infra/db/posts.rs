use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PostsRepo, RepoError},
    domain::{entities::PostRecord, types::Locale},
};

use super::{PostgresRepositories, map_sqlx_error};

const POST_COLUMNS: &str = "id, locale, slug, title, excerpt, body_markdown, cover_image, \
    published_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    locale: Locale,
    slug: String,
    title: String,
    excerpt: String,
    body_markdown: String,
    cover_image: Option<String>,
    published_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            locale: row.locale,
            slug: row.slug,
            title: row.title,
            excerpt: row.excerpt,
            body_markdown: row.body_markdown,
            cover_image: row.cover_image,
            published_at: row.published_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_published(
        &self,
        locale: Locale,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE locale = $1 AND published_at IS NOT NULL AND published_at <= now() \
             ORDER BY published_at DESC, id DESC \
             LIMIT $2"
        );

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(locale)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_published_by_slug(
        &self,
        locale: Locale,
        slug: &str,
    ) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE locale = $1 AND slug = $2 \
               AND published_at IS NOT NULL AND published_at <= now()"
        );

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(locale)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}
