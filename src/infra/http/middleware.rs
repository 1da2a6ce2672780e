use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::error::{ApiError, ErrorReport};
use super::state::AppState;

/// Header a scheduler sets so its triggers are distinguishable from manual
/// ones in the logs.
pub const SCHEDULED_CALLER_HEADER: &str = "x-scheduled-caller";

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target: "scorta::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms,
                source,
                detail = %detail,
                chain = ?messages,
                "request failed",
            );
        } else {
            warn!(
                target: "scorta::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms,
                source,
                detail = %detail,
                "client request error",
            );
        }
    }

    response
}

/// Bearer-token gate for the warming trigger. Fails closed: with no token
/// configured every trigger is rejected.
pub async fn warm_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.warm_token.as_deref() else {
        return ApiError::unauthorized().into_response();
    };

    let presented = extract_token(request.headers().get(header::AUTHORIZATION));
    match presented {
        Some(token) if token == expected => {
            let scheduled = request
                .headers()
                .get(SCHEDULED_CALLER_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("manual");
            info!(
                target: "scorta::http::warm",
                caller = scheduled,
                path = %request.uri().path(),
                "warming request authorized"
            );
            next.run(request).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

fn extract_token(header: Option<&axum::http::HeaderValue>) -> Option<&str> {
    header?.to_str().ok()?.strip_prefix("Bearer ")
}
