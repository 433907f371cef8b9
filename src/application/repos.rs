//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{InventoryItem, PageRecord, PostRecord, ReviewRecord};
use crate::domain::types::{Locale, PageKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InventoryQueryFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Published posts for `locale`, newest first.
    async fn list_published(
        &self,
        locale: Locale,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_published_by_slug(
        &self,
        locale: Locale,
        slug: &str,
    ) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PagesRepo: Send + Sync {
    async fn list_published(
        &self,
        kind: PageKind,
        locale: Locale,
    ) -> Result<Vec<PageRecord>, RepoError>;

    async fn find_published_by_slug(
        &self,
        kind: PageKind,
        locale: Locale,
        slug: &str,
    ) -> Result<Option<PageRecord>, RepoError>;
}

#[async_trait]
pub trait InventoryRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InventoryItem>, RepoError>;

    /// Listed items (available and not sold), most recent first.
    async fn list_available(
        &self,
        filter: &InventoryQueryFilter,
        limit: u32,
    ) -> Result<Vec<InventoryItem>, RepoError>;

    /// Listed items other than `exclude`, most recent first.
    async fn list_available_excluding(
        &self,
        exclude: Uuid,
        limit: u32,
    ) -> Result<Vec<InventoryItem>, RepoError>;
}

#[async_trait]
pub trait ReviewsRepo: Send + Sync {
    async fn list_published(&self, locale: Locale) -> Result<Vec<ReviewRecord>, RepoError>;
}
