//! Operational API: warming trigger/status, view recording, and rankings.
//!
//! The warming trigger sits behind bearer auth; everything else is open but
//! degrades to 503 when the store is disabled.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{PopularEntry, TriggerOutcome, WarmingRun};
use crate::domain::content::is_valid_slug;
use crate::domain::types::Category;

use super::error::ApiError;
use super::middleware::warm_auth;
use super::state::AppState;

const MAX_POPULAR_LIMIT: usize = 100;
const DEFAULT_POPULAR_LIMIT: usize = 20;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let warm_trigger = Router::new()
        .route("/api/warm", post(trigger_warm))
        .route_layer(middleware::from_fn_with_state(state, warm_auth));

    Router::new()
        .merge(warm_trigger)
        .route("/api/warm/status", get(warm_status))
        .route(
            "/api/views/{category}/{slug}",
            post(record_view).get(view_count),
        )
        .route("/api/popular/{category}", get(popular))
}

#[derive(Debug, Serialize)]
struct TriggerBody {
    success: bool,
    message: String,
}

async fn trigger_warm(State(state): State<AppState>) -> Response {
    let outcome = state.warmer.trigger().await;
    let status = match &outcome {
        TriggerOutcome::Completed { .. } => StatusCode::OK,
        TriggerOutcome::AlreadyRunning => StatusCode::TOO_MANY_REQUESTS,
        TriggerOutcome::StoreDisabled => StatusCode::SERVICE_UNAVAILABLE,
        TriggerOutcome::StoreUnavailable | TriggerOutcome::Failed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = TriggerBody {
        success: outcome.success(),
        message: outcome.message().to_string(),
    };
    (status, Json(body)).into_response()
}

async fn warm_status(State(state): State<AppState>) -> Json<WarmingRun> {
    Json(state.warmer.status().await)
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found("Unknown category"))
}

/// Fire-and-forget: the response never waits on the store, and a failed
/// increment only costs one view.
async fn record_view(
    State(state): State<AppState>,
    Path((category, slug)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let category = parse_category(&category)?;
    if !is_valid_slug(&slug) {
        return Err(ApiError::bad_request("Invalid slug", None));
    }
    if !state.popularity.is_enabled() {
        return Err(ApiError::store_disabled());
    }

    let popularity = state.popularity.clone();
    tokio::spawn(async move {
        if let Err(err) = popularity.record_view(category, &slug).await {
            warn!(
                target: "scorta::views",
                %category,
                slug,
                error = %err,
                "view increment lost"
            );
        }
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Serialize)]
struct ViewCountBody {
    views: u64,
}

async fn view_count(
    State(state): State<AppState>,
    Path((category, slug)): Path<(String, String)>,
) -> Result<Json<ViewCountBody>, ApiError> {
    let category = parse_category(&category)?;
    if !state.popularity.is_enabled() {
        return Err(ApiError::store_disabled());
    }
    let views = state
        .popularity
        .get_view_count(category, &slug)
        .await
        .map_err(ApiError::unavailable)?;
    Ok(Json(ViewCountBody { views }))
}

#[derive(Debug, Deserialize)]
struct PopularParams {
    limit: Option<usize>,
}

async fn popular(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<PopularParams>,
) -> Result<Json<Vec<PopularEntry>>, ApiError> {
    let category = parse_category(&category)?;
    if !state.popularity.is_enabled() {
        return Err(ApiError::store_disabled());
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_POPULAR_LIMIT)
        .min(MAX_POPULAR_LIMIT);
    let entries = state
        .popularity
        .get_popular(category, limit)
        .await
        .map_err(ApiError::unavailable)?;
    Ok(Json(entries))
}
