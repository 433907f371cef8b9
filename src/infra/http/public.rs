use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    application::{
        air_quality::AirQualityCache,
        content::{ContentService, DEFAULT_POSTS_PER_PAGE},
        error::HttpError,
        marketplace::{DEFAULT_RELATED_LIMIT, MarketplaceService},
        repos::InventoryQueryFilter,
        reviews::{DEFAULT_SAMPLE_SIZE, ReviewService},
    },
    domain::types::{Locale, PageKind},
};

use super::{
    HealthProbe, db_health_response,
    middleware::trace_requests,
};

/// Response header telling clients how the air-quality reading was served.
pub const AQI_CACHE_HEADER: &str = "x-aqi-cache";

#[derive(Clone)]
pub struct HttpState {
    pub content: Arc<ContentService>,
    pub marketplace: Arc<MarketplaceService>,
    pub reviews: Arc<ReviewService>,
    pub air_quality: Arc<AirQualityCache>,
    pub health: Arc<dyn HealthProbe>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/air-quality", get(air_quality))
        .route("/api/inventory", get(inventory_list))
        .route("/api/inventory/{id}", get(inventory_detail))
        .route("/api/inventory/{id}/related", get(inventory_related))
        .route("/api/{locale}/posts", get(post_list))
        .route("/api/{locale}/posts/{slug}", get(post_detail))
        .route("/api/{locale}/pages/{kind}", get(page_list))
        .route("/api/{locale}/pages/{kind}/{slug}", get(page_detail))
        .route("/api/{locale}/reviews", get(review_sample))
        .route("/_health/db", get(public_health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(trace_requests))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedQuery {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryQuery {
    category: Option<String>,
    brand: Option<String>,
}

impl InventoryQuery {
    fn into_filter(self) -> InventoryQueryFilter {
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        InventoryQueryFilter {
            category: clean(self.category),
            brand: clean(self.brand),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReviewsQuery {
    count: Option<usize>,
}

fn parse_locale(raw: &str) -> Result<Locale, HttpError> {
    raw.parse()
        .map_err(|_| HttpError::not_found("infra::http::public::locale", format!("unknown locale `{raw}`")))
}

fn parse_page_kind(raw: &str) -> Result<PageKind, HttpError> {
    raw.parse().map_err(|_| {
        HttpError::not_found("infra::http::public::page_kind", format!("unknown page kind `{raw}`"))
    })
}

/// Malformed ids cannot name an item, so they are reported as missing.
fn parse_item_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw).map_err(|_| {
        HttpError::not_found("infra::http::public::inventory", format!("invalid item id `{raw}`"))
    })
}

fn found<T: serde::Serialize>(value: Option<T>, source: &'static str, what: &str) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => HttpError::not_found(source, format!("{what} not found")).into_response(),
    }
}

async fn air_quality(State(state): State<HttpState>) -> Response {
    match state.air_quality.current().await {
        Ok(served) => {
            let mut response = Json(served.reading).into_response();
            let headers = response.headers_mut();
            headers.insert(
                AQI_CACHE_HEADER,
                HeaderValue::from_static(served.freshness.as_str()),
            );
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        Err(err) => HttpError::from_error(
            "infra::http::public::air_quality",
            StatusCode::BAD_GATEWAY,
            "Air quality is temporarily unavailable",
            &err,
        )
        .into_response(),
    }
}

async fn inventory_list(
    State(state): State<HttpState>,
    Query(query): Query<InventoryQuery>,
) -> Response {
    match state.marketplace.listings(&query.into_filter()).await {
        Ok(items) => Json(items).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn inventory_detail(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(query): Query<RelatedQuery>,
) -> Response {
    let id = match parse_item_id(&id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_RELATED_LIMIT);

    match state.marketplace.item_detail(id, limit).await {
        Ok(detail) => found(detail, "infra::http::public::inventory_detail", "item"),
        Err(err) => err.into_response(),
    }
}

async fn inventory_related(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(query): Query<RelatedQuery>,
) -> Response {
    let id = match parse_item_id(&id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_RELATED_LIMIT);

    match state.marketplace.related(id, limit).await {
        Ok(related) => found(related, "infra::http::public::inventory_related", "item"),
        Err(err) => err.into_response(),
    }
}

async fn post_list(
    State(state): State<HttpState>,
    Path(locale): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Response, HttpError> {
    let locale = parse_locale(&locale)?;
    let limit = query.limit.unwrap_or(DEFAULT_POSTS_PER_PAGE);
    let posts = state.content.posts(locale, limit).await?;
    Ok(Json(posts).into_response())
}

async fn post_detail(
    State(state): State<HttpState>,
    Path((locale, slug)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let locale = parse_locale(&locale)?;
    let post = state.content.post(locale, &slug).await?;
    Ok(found(post, "infra::http::public::post_detail", "post"))
}

async fn page_list(
    State(state): State<HttpState>,
    Path((locale, kind)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let locale = parse_locale(&locale)?;
    let kind = parse_page_kind(&kind)?;
    let pages = state.content.pages(kind, locale).await?;
    Ok(Json(pages).into_response())
}

async fn page_detail(
    State(state): State<HttpState>,
    Path((locale, kind, slug)): Path<(String, String, String)>,
) -> Result<Response, HttpError> {
    let locale = parse_locale(&locale)?;
    let kind = parse_page_kind(&kind)?;
    let page = state.content.page(kind, locale, &slug).await?;
    Ok(found(page, "infra::http::public::page_detail", "page"))
}

async fn review_sample(
    State(state): State<HttpState>,
    Path(locale): Path<String>,
    Query(query): Query<ReviewsQuery>,
) -> Result<Response, HttpError> {
    let locale = parse_locale(&locale)?;
    let count = query.count.unwrap_or(DEFAULT_SAMPLE_SIZE);
    let reviews = state.reviews.sample(locale, count).await?;
    Ok(Json(reviews).into_response())
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.check().await)
}

async fn fallback() -> Response {
    HttpError::not_found("infra::http::public::fallback", "no route matched").into_response()
}
