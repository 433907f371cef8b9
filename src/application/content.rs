use std::sync::Arc;

use axum::http::StatusCode;

use crate::application::error::HttpError;
use crate::application::repos::{PagesRepo, PostsRepo, RepoError};
use crate::domain::entities::{PageRecord, PostRecord};
use crate::domain::types::{Locale, PageKind};

const SOURCE: &str = "application::content::ContentService";

pub const DEFAULT_POSTS_PER_PAGE: u32 = 12;
pub const MAX_POSTS_PER_PAGE: u32 = 50;

/// Read-only access to CMS-managed posts and landing pages.
#[derive(Clone)]
pub struct ContentService {
    posts: Arc<dyn PostsRepo>,
    pages: Arc<dyn PagesRepo>,
}

impl ContentService {
    pub fn new(posts: Arc<dyn PostsRepo>, pages: Arc<dyn PagesRepo>) -> Self {
        Self { posts, pages }
    }

    pub async fn posts(&self, locale: Locale, limit: u32) -> Result<Vec<PostRecord>, HttpError> {
        self.posts
            .list_published(locale, limit.clamp(1, MAX_POSTS_PER_PAGE))
            .await
            .map_err(|err| repo_failure("list_posts", err))
    }

    pub async fn post(&self, locale: Locale, slug: &str) -> Result<Option<PostRecord>, HttpError> {
        self.posts
            .find_published_by_slug(locale, slug)
            .await
            .map_err(|err| repo_failure("find_post", err))
    }

    pub async fn pages(&self, kind: PageKind, locale: Locale) -> Result<Vec<PageRecord>, HttpError> {
        self.pages
            .list_published(kind, locale)
            .await
            .map_err(|err| repo_failure("list_pages", err))
    }

    pub async fn page(
        &self,
        kind: PageKind,
        locale: Locale,
        slug: &str,
    ) -> Result<Option<PageRecord>, HttpError> {
        self.pages
            .find_published_by_slug(kind, locale, slug)
            .await
            .map_err(|err| repo_failure("find_page", err))
    }
}

fn repo_failure(operation: &'static str, err: RepoError) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to load content",
        format!("{operation} failed: {err}"),
    )
}
