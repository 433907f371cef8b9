//! Weighted attribute matching used to rank related marketplace listings.

use crate::domain::entities::InventoryItem;

pub const BRAND_WEIGHT: f32 = 2.0;
pub const CATEGORY_WEIGHT: f32 = 1.0;
pub const GENDER_WEIGHT: f32 = 0.5;

/// Pool size fetched per requested slot so the ranking has material to sort.
pub const POOL_MULTIPLIER: usize = 3;

/// Relevance of `candidate` with respect to `reference`.
pub fn relevance(reference: &InventoryItem, candidate: &InventoryItem) -> f32 {
    let mut score = 0.0;
    if candidate.brand == reference.brand {
        score += BRAND_WEIGHT;
    }
    if candidate.category == reference.category {
        score += CATEGORY_WEIGHT;
    }
    if candidate.gender == reference.gender {
        score += GENDER_WEIGHT;
    }
    score
}

/// Rank `pool` against `reference` and keep at most `limit` entries.
///
/// The reference itself is dropped even if the pool contains it. Ordering is
/// stable, so equal scores keep the pool's incoming order, and zero-score
/// candidates still fill the remaining slots.
pub fn rank(
    reference: &InventoryItem,
    pool: Vec<InventoryItem>,
    limit: usize,
) -> Vec<InventoryItem> {
    let mut scored: Vec<(f32, InventoryItem)> = pool
        .into_iter()
        .filter(|candidate| candidate.id != reference.id)
        .map(|candidate| (relevance(reference, &candidate), candidate))
        .collect();

    scored.sort_by(|(left, _), (right, _)| right.total_cmp(left));
    scored.truncate(limit);
    scored.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::domain::entities::InventoryItem;
    use crate::domain::types::Condition;

    pub(crate) fn item(brand: &str, category: &str, gender: &str) -> InventoryItem {
        InventoryItem {
            id: Uuid::new_v4(),
            slug: format!("{}-{}", brand, category).to_lowercase(),
            brand: brand.to_string(),
            model: "Test".to_string(),
            category: category.to_string(),
            price_cents: 15_000,
            condition: Condition::Good,
            gender: gender.to_string(),
            is_available: true,
            is_sold: false,
            image_path: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
