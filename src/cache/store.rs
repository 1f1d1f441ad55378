//! Cache store abstraction.
//!
//! # Responsibilities
//! - Define the cached artifact (`CachedResponse`)
//! - Define the `match` / `put` contract the retriever depends on
//!
//! # Design Decisions
//! - Bodies are immutable `Bytes`: the stored copy and the copy handed to
//!   the caller are independent readers of one buffer
//! - Expiry and eviction belong to the store, never to the retriever

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use thiserror::Error;

use crate::cache::key::CacheKey;

/// A fully-buffered response as stored in, and served from, the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body }
    }
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Errors raised when writing to a store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The response's cache-control forbids or does not permit storage.
    #[error("response is not cacheable: {0}")]
    NotCacheable(&'static str),

    /// The backing store rejected the write.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// A shared key → response store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Return the live entry for `key`, if any.
    async fn lookup(&self, key: &CacheKey) -> Option<CachedResponse>;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError>;

    /// Number of entries currently held.
    fn entry_count(&self) -> usize;
}
