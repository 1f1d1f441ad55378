//! Method dispatch for the read and write paths.
//!
//! ```text
//! GET  /any?url=<image>                       → retriever → image bytes
//! POST /any {"url": ..., "access_token": ...} → retriever → {"status":"OK"}
//! other                                       → 405
//! ```

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::http::request::{parse_warm_request, target_from_query, tokens_match, RequestError};
use crate::http::response::status_ok;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Entry point for every inbound request.
pub async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = match method {
        Method::GET => handle_get(&state, request).await.into_response(),
        Method::POST => handle_post(&state, request).await.into_response(),
        _ => RequestError::MethodNotAllowed.into_response(),
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn handle_get(state: &AppState, request: Request<Body>) -> Result<Response, RequestError> {
    let target = target_from_query(request.uri().query())?;
    tracing::debug!(target = %target, "Read request");

    let retrieval = state.retriever.retrieve(&request, &target).await;
    tracing::debug!(target = %target, outcome = retrieval.outcome.label(), "Read complete");
    Ok(retrieval.response.into_response())
}

async fn handle_post(state: &AppState, request: Request<Body>) -> Result<Response, RequestError> {
    let (parts, body) = request.into_parts();

    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_size) {
        return Err(RequestError::BodyTooLarge);
    }

    // Undeclared (chunked) bodies are capped while reading.
    let body = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|_| RequestError::BodyTooLarge)?;
    let warm = parse_warm_request(&body)?;

    if !tokens_match(&warm.access_token, &state.api_token) {
        tracing::warn!("Write rejected: invalid access token");
        return Err(RequestError::InvalidToken);
    }

    let target = Url::parse(&warm.url).map_err(|_| RequestError::InvalidUrl)?;
    tracing::debug!(target = %target, "Write request");

    // Keyed by the POST's own URL, exactly as a GET to that URL would be.
    let inbound = Request::from_parts(parts, ());
    let retrieval = state.retriever.retrieve(&inbound, &target).await;
    tracing::info!(target = %target, outcome = retrieval.outcome.label(), "Cache warmed");

    Ok(status_ok())
}
