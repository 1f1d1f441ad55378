//! Cacheable response headers.
//!
//! The cached artifact carries exactly two headers. Everything else an
//! origin sent (cookies, etags, vendor headers) is dropped so nothing
//! origin-specific leaks into a shared cache entry.

use axum::http::{header, HeaderMap, HeaderValue};

use crate::cache::mime::{content_type_of, DEFAULT_CONTENT_TYPE};

/// Three days, in seconds.
pub const CACHE_MAX_AGE_SECS: u64 = 259_200;

/// Directive attached to every cached image response.
pub const CACHE_CONTROL_VALUE: &str = "public, max-age=259200";

/// Build the `content-type` + `cache-control` header pair for a response.
pub fn rewrite_headers(origin: &HeaderMap) -> HeaderMap {
    let content_type = HeaderValue::from_str(content_type_of(origin))
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    headers
}
