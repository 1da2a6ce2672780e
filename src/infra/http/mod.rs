mod api;
mod error;
mod middleware;
mod public;
mod state;

pub use error::{ApiError, ApiErrorBody, ErrorReport};
pub use middleware::SCHEDULED_CALLER_HEADER;
pub use state::AppState;

use axum::Router;

/// Assemble the full HTTP surface: public read path plus the operational API,
/// all behind the response-logging middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(public::public_routes())
        .merge(api::api_routes(state.clone()))
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .with_state(state)
}
