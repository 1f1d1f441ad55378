//! Response construction.
//!
//! # Responsibilities
//! - Map request rejections to status codes and short text bodies
//! - Build the write path status envelope
//!
//! # Design Decisions
//! - Image responses come straight from the retriever; nothing here
//!   touches their headers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::request::RequestError;

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::EmptyBody | RequestError::InvalidJson | RequestError::InvalidUrl => {
                StatusCode::BAD_REQUEST
            }
            RequestError::InvalidToken => StatusCode::FORBIDDEN,
            RequestError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Body returned by a successful write.
#[derive(Debug, Serialize)]
pub struct StatusEnvelope {
    pub status: &'static str,
}

/// `200 {"status":"OK"}`.
pub fn status_ok() -> Response {
    (StatusCode::OK, Json(StatusEnvelope { status: "OK" })).into_response()
}
