//! Public read path: category listings, single items, the SEO bundle, and
//! the health probe. Unknown categories are 404s, origin outages are 503s,
//! and cache-layer failures never surface here at all.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::cache::{LoadSource, Loaded};
use crate::domain::types::Category;

use super::error::ApiError;
use super::state::AppState;

const CACHE_STATUS_HEADER: &str = "x-cache-status";

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/content/{category}", get(category_listing))
        .route("/content/{category}/{slug}", get(content_item))
        .route("/seo/content", get(seo_bundle))
        .route("/_health", get(health))
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found("Unknown category"))
}

/// JSON response annotated with whether it was served from the cache.
fn loaded_response<T: serde::Serialize>(loaded: Loaded<T>) -> Response {
    let status = match loaded.source {
        LoadSource::Cache => "hit",
        LoadSource::Origin => "miss",
    };
    let mut response = Json(loaded.value).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static(status));
    response
}

async fn category_listing(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Response, ApiError> {
    let category = parse_category(&category)?;
    let loaded = state
        .content
        .get_content_by_category(category)
        .await
        .map_err(ApiError::unavailable)?;
    Ok(loaded_response(loaded))
}

async fn content_item(
    State(state): State<AppState>,
    Path((category, slug)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let category = parse_category(&category)?;
    let loaded = state
        .content
        .get_content_item_by_slug(category, &slug)
        .await
        .map_err(ApiError::unavailable)?;
    match loaded.value {
        Some(item) => Ok(loaded_response(Loaded {
            value: item,
            source: loaded.source,
            write_back: loaded.write_back,
        })),
        None => Err(ApiError::not_found("Content item not found")),
    }
}

async fn seo_bundle(State(state): State<AppState>) -> Result<Response, ApiError> {
    let loaded = state
        .content
        .get_seo_content()
        .await
        .map_err(ApiError::unavailable)?;
    Ok(loaded_response(loaded))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
