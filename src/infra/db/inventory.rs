use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{InventoryQueryFilter, InventoryRepo, RepoError},
    domain::{entities::InventoryItem, types::Condition},
};

use super::{PostgresRepositories, map_sqlx_error};

const ITEM_COLUMNS: &str = "id, slug, brand, model, category, price_cents, condition, gender, \
    is_available, is_sold, image_path, created_at";

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: Uuid,
    slug: String,
    brand: String,
    model: String,
    category: String,
    price_cents: i64,
    condition: Condition,
    gender: String,
    is_available: bool,
    is_sold: bool,
    image_path: Option<String>,
    created_at: OffsetDateTime,
}

impl From<InventoryRow> for InventoryItem {
    fn from(row: InventoryRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            brand: row.brand,
            model: row.model,
            category: row.category,
            price_cents: row.price_cents,
            condition: row.condition,
            gender: row.gender,
            is_available: row.is_available,
            is_sold: row.is_sold,
            image_path: row.image_path,
            created_at: row.created_at,
        }
    }
}

impl PostgresRepositories {
    fn push_listed_items<'q>(qb: &mut QueryBuilder<'q, Postgres>) {
        qb.push("SELECT ");
        qb.push(ITEM_COLUMNS);
        qb.push(" FROM inventory_items WHERE is_available AND NOT is_sold");
    }
}

#[async_trait]
impl InventoryRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InventoryItem>, RepoError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1");

        let row = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(InventoryItem::from))
    }

    async fn list_available(
        &self,
        filter: &InventoryQueryFilter,
        limit: u32,
    ) -> Result<Vec<InventoryItem>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("");
        Self::push_listed_items(&mut qb);

        if let Some(category) = filter.category.as_ref() {
            qb.push(" AND lower(category) = lower(");
            qb.push_bind(category);
            qb.push(")");
        }

        if let Some(brand) = filter.brand.as_ref() {
            qb.push(" AND lower(brand) = lower(");
            qb.push_bind(brand);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<InventoryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }

    async fn list_available_excluding(
        &self,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<InventoryItem>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("");
        Self::push_listed_items(&mut qb);
        qb.push(" AND id <> ");
        qb.push_bind(exclude);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<InventoryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }
}
