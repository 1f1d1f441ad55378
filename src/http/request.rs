//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Extract the target image URL from the read path query string
//! - Parse and authenticate write path bodies
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Input is rejected here, before the retriever sees it

use axum::http::{HeaderValue, Request};
use serde::Deserialize;
use thiserror::Error;
use tower_http::request_id::{MakeRequestId, RequestId};
use url::{form_urlencoded, Url};
use uuid::Uuid;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Query parameter naming the target image on the read path.
pub const URL_PARAM: &str = "url";

/// Assigns a fresh UUID v4 to every request without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(id))
    }
}

/// Ways an inbound request is rejected before reaching the retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Bad request")]
    EmptyBody,

    #[error("Input is invalid.")]
    InvalidJson,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("Invalid URL.")]
    InvalidUrl,

    #[error("Payload too large")]
    BodyTooLarge,

    #[error("Method not allowed")]
    MethodNotAllowed,
}

/// Write path body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WarmRequest {
    pub url: String,
    pub access_token: String,
}

/// Target URL from a read path query string.
pub fn target_from_query(query: Option<&str>) -> Result<Url, RequestError> {
    let raw = query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(name, _)| name == URL_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .ok_or(RequestError::InvalidUrl)?;

    Url::parse(&raw).map_err(|_| RequestError::InvalidUrl)
}

/// Parse a write path body. An empty body is rejected separately from
/// malformed JSON.
pub fn parse_warm_request(body: &[u8]) -> Result<WarmRequest, RequestError> {
    if body.is_empty() {
        return Err(RequestError::EmptyBody);
    }
    serde_json::from_slice(body).map_err(|_| RequestError::InvalidJson)
}

/// Compare a presented token with the configured one.
///
/// Runs in time independent of where the first mismatch occurs.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
