//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{Condition, Locale, PageKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub locale: Locale,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub body_markdown: String,
    pub cover_image: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub id: Uuid,
    pub kind: PageKind,
    pub locale: Locale,
    pub slug: String,
    pub title: String,
    pub meta_description: String,
    pub body_markdown: String,
    /// Street address for location pages; empty for SEO pages.
    pub address: Option<String>,
    pub city: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A used club listed on the marketplace.
///
/// Identity is the opaque `id`; listings are maintained by back-office
/// tooling and are read-only here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub slug: String,
    pub brand: String,
    pub model: String,
    pub category: String,
    pub price_cents: i64,
    pub condition: Condition,
    pub gender: String,
    pub is_available: bool,
    pub is_sold: bool,
    pub image_path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl InventoryItem {
    pub fn is_listed(&self) -> bool {
        self.is_available && !self.is_sold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub locale: Locale,
    pub author: String,
    pub rating: i16,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
