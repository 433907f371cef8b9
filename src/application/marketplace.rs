use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::related::RelatedItemsService;
use crate::application::repos::{InventoryQueryFilter, InventoryRepo, RepoError};
use crate::domain::entities::InventoryItem;

const SOURCE: &str = "application::marketplace::MarketplaceService";

pub const LISTING_LIMIT: u32 = 200;
pub const DEFAULT_RELATED_LIMIT: usize = 4;
pub const MAX_RELATED_LIMIT: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub item: InventoryItem,
    pub related: Vec<InventoryItem>,
}

/// Used-club marketplace: listings, item detail and related suggestions.
#[derive(Clone)]
pub struct MarketplaceService {
    inventory: Arc<dyn InventoryRepo>,
    related: RelatedItemsService,
}

impl MarketplaceService {
    pub fn new(inventory: Arc<dyn InventoryRepo>) -> Self {
        let related = RelatedItemsService::new(inventory.clone());
        Self { inventory, related }
    }

    pub async fn listings(
        &self,
        filter: &InventoryQueryFilter,
    ) -> Result<Vec<InventoryItem>, HttpError> {
        self.inventory
            .list_available(filter, LISTING_LIMIT)
            .await
            .map_err(|err| repo_failure("list_available", err))
    }

    pub async fn item(&self, id: Uuid) -> Result<Option<InventoryItem>, HttpError> {
        self.inventory
            .find_by_id(id)
            .await
            .map_err(|err| repo_failure("find_by_id", err))
    }

    /// Item plus related suggestions. Related lookups never fail the page.
    pub async fn item_detail(
        &self,
        id: Uuid,
        related_limit: usize,
    ) -> Result<Option<ItemDetail>, HttpError> {
        let Some(item) = self.item(id).await? else {
            return Ok(None);
        };

        let related = self
            .related
            .related_to(&item, clamp_related_limit(related_limit))
            .await
            .into_items();

        Ok(Some(ItemDetail { item, related }))
    }

    pub async fn related(
        &self,
        id: Uuid,
        related_limit: usize,
    ) -> Result<Option<Vec<InventoryItem>>, HttpError> {
        let Some(item) = self.item(id).await? else {
            return Ok(None);
        };

        Ok(Some(
            self.related
                .related_to(&item, clamp_related_limit(related_limit))
                .await
                .into_items(),
        ))
    }
}

pub fn clamp_related_limit(limit: usize) -> usize {
    limit.min(MAX_RELATED_LIMIT)
}

fn repo_failure(operation: &'static str, err: RepoError) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to load marketplace",
        format!("{operation} failed: {err}"),
    )
}
