//! Content-type normalization and the image allow-list.

use axum::http::{header, HeaderMap};

/// Returned when a response carries no usable content-type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Normalized content-types accepted from an origin.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/svg+xml",
    "image/webp",
    "image/bmp",
];

/// Strip parameters from a raw content-type value.
///
/// Returns the text before the first `;`. Absent, empty, or
/// parameter-only values yield [`DEFAULT_CONTENT_TYPE`].
pub fn normalize_content_type(raw: Option<&str>) -> &str {
    let mime = raw
        .and_then(|value| value.split(';').next())
        .unwrap_or_default();
    if mime.is_empty() {
        DEFAULT_CONTENT_TYPE
    } else {
        mime
    }
}

/// Normalized content-type of a header map.
///
/// A value that is not visible ASCII counts as absent.
pub fn content_type_of(headers: &HeaderMap) -> &str {
    normalize_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )
}

/// True when `mime` is one of [`ALLOWED_MIME_TYPES`].
pub fn is_allowed_image(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}
