use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{PagesRepo, RepoError},
    domain::{
        entities::PageRecord,
        types::{Locale, PageKind},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const PAGE_COLUMNS: &str = "id, kind, locale, slug, title, meta_description, body_markdown, \
    address, city, published_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    kind: PageKind,
    locale: Locale,
    slug: String,
    title: String,
    meta_description: String,
    body_markdown: String,
    address: Option<String>,
    city: Option<String>,
    published_at: Option<OffsetDateTime>,
    updated_at: OffsetDateTime,
}

impl From<PageRow> for PageRecord {
    fn from(row: PageRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            locale: row.locale,
            slug: row.slug,
            title: row.title,
            meta_description: row.meta_description,
            body_markdown: row.body_markdown,
            address: row.address,
            city: row.city,
            published_at: row.published_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn list_published(
        &self,
        kind: PageKind,
        locale: Locale,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages \
             WHERE kind = $1 AND locale = $2 AND published_at IS NOT NULL \
             ORDER BY title ASC, id ASC"
        );

        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(kind)
            .bind(locale)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PageRecord::from).collect())
    }

    async fn find_published_by_slug(
        &self,
        kind: PageKind,
        locale: Locale,
        slug: &str,
    ) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages \
             WHERE kind = $1 AND locale = $2 AND slug = $3 AND published_at IS NOT NULL"
        );

        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(kind)
            .bind(locale)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PageRecord::from))
    }
}
