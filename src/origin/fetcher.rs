//! Outbound HTTP fetches.
//!
//! The fetcher is transport only: it returns whatever status the remote
//! answered with and leaves success/failure policy to the retriever.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{OriginConfig, TimeoutConfig};

/// A buffered response from an origin or the fallback location.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Errors that can occur while fetching from a remote.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, TLS, timeout, redirect or body read failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body is larger than the configured limit.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

/// Issues GET requests to remote hosts.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<OriginResponse, FetchError>;
}

/// `reqwest`-backed fetcher with a body size cap.
#[derive(Clone)]
pub struct HttpOriginFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpOriginFetcher {
    /// Build a fetcher from origin limits and timeouts.
    pub fn new(origin: &OriginConfig, timeouts: &TimeoutConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.origin_secs))
            .redirect(reqwest::redirect::Policy::limited(origin.max_redirects))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self::with_client(client, origin.max_image_bytes))
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<OriginResponse, FetchError> {
        let limit = self.max_body_bytes;
        let mut response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await?;

        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::BodyTooLarge { limit });
        }

        let status = response.status();
        let headers = response.headers().clone();

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(OriginResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}
