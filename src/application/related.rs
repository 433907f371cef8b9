use std::sync::Arc;

use metrics::counter;
use tracing::warn;

use crate::application::repos::{InventoryRepo, RepoError};
use crate::domain::entities::InventoryItem;
use crate::domain::related::{POOL_MULTIPLIER, rank};

const SOURCE: &str = "application::related::RelatedItemsService";

/// Outcome of a related-items lookup.
///
/// Keeps "nothing to show" apart from "the data source failed" while still
/// letting page builders collapse both into an empty list.
#[derive(Debug)]
pub enum RelatedItems {
    Found(Vec<InventoryItem>),
    Empty,
    Unavailable(RepoError),
}

impl RelatedItems {
    pub fn into_items(self) -> Vec<InventoryItem> {
        match self {
            RelatedItems::Found(items) => items,
            RelatedItems::Empty | RelatedItems::Unavailable(_) => Vec::new(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RelatedItems::Unavailable(_))
    }
}

#[derive(Clone)]
pub struct RelatedItemsService {
    inventory: Arc<dyn InventoryRepo>,
}

impl RelatedItemsService {
    pub fn new(inventory: Arc<dyn InventoryRepo>) -> Self {
        Self { inventory }
    }

    /// Up to `limit` listed items most similar to `reference`.
    pub async fn related_to(&self, reference: &InventoryItem, limit: usize) -> RelatedItems {
        if limit == 0 {
            return RelatedItems::Empty;
        }

        let pool_size = u32::try_from(limit.saturating_mul(POOL_MULTIPLIER)).unwrap_or(u32::MAX);
        let pool = match self
            .inventory
            .list_available_excluding(reference.id, pool_size)
            .await
        {
            Ok(pool) => pool,
            Err(err) => {
                counter!("teebox_related_unavailable_total").increment(1);
                warn!(
                    target = "teebox::related",
                    source = SOURCE,
                    item_id = %reference.id,
                    error = %err,
                    "related items unavailable"
                );
                return RelatedItems::Unavailable(err);
            }
        };

        let ranked = rank(reference, pool, limit);
        if ranked.is_empty() {
            RelatedItems::Empty
        } else {
            RelatedItems::Found(ranked)
        }
    }
}
