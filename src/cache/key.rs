//! Cache key derivation.
//!
//! A key is the absolute URL of the inbound request, as if it were a GET
//! with no headers. Caller-supplied headers never participate, so repeated
//! reads of the same URL land on the same entry.

use std::fmt;

use axum::http::{header, Request};

/// Normalized identity of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for an inbound request.
    ///
    /// The host is taken from the URI authority when the request carries an
    /// absolute URI, otherwise from the `Host` header.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let uri = request.uri();
        let scheme = uri.scheme_str().unwrap_or("http");
        let host = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                request
                    .headers()
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_default()
            .to_lowercase();
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        Self(format!("{}://{}{}", scheme, host, path_and_query))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
