//! Cache-aside image retrieval.
//!
//! # State Machine
//! ```text
//! key ─▶ lookup ──hit (2xx)──────────────────────────────▶ return cached
//!          │
//!          └─miss─▶ origin GET ──ok, 2xx, image/*──▶ Accept ──▶ put ─▶ return
//!                      │
//!                      └─error / non-2xx / bad mime─▶ Fallback ─▶ put ─▶ return
//!                                                        │
//!                                                        └─fallback fails─▶ 502, not cached
//! ```
//!
//! # Design Decisions
//! - No retries: one origin failure routes straight to the fallback
//! - Fallback responses are cached like real images so dead URLs do not
//!   hammer their origin
//! - Cache writes are best-effort; a failed put never changes the response
//! - Accepted and fallback responses are always re-issued as 200; partial or
//!   informational 2xx statuses from a remote are not carried into the cache
//! - No single-flight: concurrent cold misses may both fetch and both write

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use bytes::Bytes;
use url::Url;

use crate::cache::key::CacheKey;
use crate::cache::mime::{content_type_of, is_allowed_image};
use crate::cache::rewrite::rewrite_headers;
use crate::cache::store::{CacheStore, CachedResponse};
use crate::observability::metrics;
use crate::origin::{self, FetchError, OriginFetcher};

/// Why the origin image was replaced by the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The origin could not be reached or its body could not be read.
    Unreachable,
    /// The origin answered with a non-success status.
    Status(StatusCode),
    /// The origin's normalized content-type is not an allowed image type.
    DisallowedType(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Unreachable => write!(f, "origin unreachable"),
            FallbackReason::Status(status) => write!(f, "origin returned {}", status),
            FallbackReason::DisallowedType(mime) => write!(f, "disallowed content-type {}", mime),
        }
    }
}

/// How a retrieval was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Served from the cache store without any network call.
    Hit,
    /// Fetched from origin, accepted, and cached.
    Fetched,
    /// Origin unusable; fallback image served and cached.
    Fallback(FallbackReason),
    /// Origin unusable and the fallback could not be fetched either.
    FallbackUnavailable,
}

impl RetrievalOutcome {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalOutcome::Hit => "hit",
            RetrievalOutcome::Fetched => "fetched",
            RetrievalOutcome::Fallback(_) => "fallback",
            RetrievalOutcome::FallbackUnavailable => "fallback_unavailable",
        }
    }
}

/// A response together with how it was produced.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub outcome: RetrievalOutcome,
    pub response: CachedResponse,
}

/// Fetch-or-serve-cached for remote images.
pub struct Retriever {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn OriginFetcher>,
    fallback_url: Url,
}

impl Retriever {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn OriginFetcher>, fallback_url: Url) -> Self {
        Self {
            store,
            fetcher,
            fallback_url,
        }
    }

    /// The store backing this retriever.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Retrieve `target`, keyed by the inbound request.
    ///
    /// Only the request's URL is used; its method, headers and body are
    /// ignored. The key is derived before the returned future is polled, so
    /// the request is not borrowed across any await.
    pub fn retrieve<'a, B>(
        &'a self,
        inbound: &Request<B>,
        target: &'a Url,
    ) -> impl Future<Output = Retrieval> + Send + 'a {
        self.retrieve_keyed(CacheKey::from_request(inbound), target)
    }

    /// Retrieve `target` under an already-derived key.
    pub async fn retrieve_keyed(&self, key: CacheKey, target: &Url) -> Retrieval {
        if let Some(cached) = self.store.lookup(&key).await {
            if cached.status.is_success() {
                tracing::debug!(key = %key, "Cache hit");
                return self.finish(RetrievalOutcome::Hit, cached);
            }
            tracing::debug!(key = %key, status = %cached.status, "Ignoring unusable cache entry");
        }

        let headers = origin::headers_for(&origin::host_of(target));
        let started = Instant::now();
        let fetched = self.fetcher.fetch(target, headers).await;

        let accepted = match fetched {
            Err(e) => {
                metrics::record_origin_fetch("error", started);
                tracing::info!(key = %key, target = %target, error = %e, "Origin fetch failed");
                Err(FallbackReason::Unreachable)
            }
            Ok(resp) if !resp.status.is_success() => {
                metrics::record_origin_fetch("status", started);
                Err(FallbackReason::Status(resp.status))
            }
            Ok(resp) => {
                metrics::record_origin_fetch("ok", started);
                let mime = content_type_of(&resp.headers);
                if is_allowed_image(mime) {
                    Ok(resp)
                } else {
                    Err(FallbackReason::DisallowedType(mime.to_string()))
                }
            }
        };

        match accepted {
            Ok(resp) => {
                tracing::debug!(key = %key, target = %target, bytes = resp.body.len(), "Origin image accepted");
                let response = CachedResponse::new(StatusCode::OK, rewrite_headers(&resp.headers), resp.body);
                self.populate(key, &response).await;
                self.finish(RetrievalOutcome::Fetched, response)
            }
            Err(reason) => {
                tracing::info!(key = %key, target = %target, reason = %reason, "Serving fallback image");
                match self.fetch_fallback().await {
                    Ok(response) => {
                        self.populate(key, &response).await;
                        self.finish(RetrievalOutcome::Fallback(reason), response)
                    }
                    Err(e) => {
                        tracing::error!(
                            key = %key,
                            fallback = %self.fallback_url,
                            error = %e,
                            "Fallback image unavailable"
                        );
                        self.finish(RetrievalOutcome::FallbackUnavailable, fallback_unavailable())
                    }
                }
            }
        }
    }

    async fn fetch_fallback(&self) -> Result<CachedResponse, FallbackError> {
        let started = Instant::now();
        let resp = self
            .fetcher
            .fetch(&self.fallback_url, HeaderMap::new())
            .await
            .map_err(FallbackError::Fetch)?;
        metrics::record_origin_fetch("fallback", started);

        if !resp.status.is_success() {
            return Err(FallbackError::Status(resp.status));
        }
        Ok(CachedResponse::new(StatusCode::OK, rewrite_headers(&resp.headers), resp.body))
    }

    /// Store a copy of `response`; failures are logged, never surfaced.
    async fn populate(&self, key: CacheKey, response: &CachedResponse) {
        if let Err(e) = self.store.put(key.clone(), response.clone()).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
        metrics::record_cache_size(self.store.entry_count());
    }

    fn finish(&self, outcome: RetrievalOutcome, response: CachedResponse) -> Retrieval {
        metrics::record_retrieval(outcome.label());
        Retrieval { outcome, response }
    }
}

#[derive(Debug, thiserror::Error)]
enum FallbackError {
    #[error(transparent)]
    Fetch(FetchError),
    #[error("fallback returned {0}")]
    Status(StatusCode),
}

/// Synthesized when neither origin nor fallback can supply an image.
fn fallback_unavailable() -> CachedResponse {
    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    CachedResponse::new(
        StatusCode::BAD_GATEWAY,
        headers,
        Bytes::from_static(b"Image unavailable"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::rewrite::CACHE_CONTROL_VALUE;
    use crate::cache::store::CacheError;
    use crate::origin::OriginResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const FALLBACK_URL: &str = "https://static.example.net/fallback.png";
    const FALLBACK_BYTES: &[u8] = b"\x89PNG fallback";

    enum Reply {
        Ok(u16, Option<&'static str>, &'static [u8]),
        Fail,
    }

    /// Canned replies per URL, with a request log.
    #[derive(Default)]
    struct FakeFetcher {
        replies: HashMap<String, Reply>,
        calls: Mutex<Vec<(String, HeaderMap)>>,
    }

    impl FakeFetcher {
        fn with_fallback() -> Self {
            Self::default().reply(FALLBACK_URL, Reply::Ok(200, Some("image/png"), FALLBACK_BYTES))
        }

        fn reply(mut self, url: &str, reply: Reply) -> Self {
            self.replies.insert(url.to_string(), reply);
            self
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
        }
    }

    #[async_trait]
    impl OriginFetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<OriginResponse, FetchError> {
            self.calls.lock().unwrap().push((url.to_string(), headers));
            match self.replies.get(url.as_str()) {
                Some(Reply::Ok(status, content_type, body)) => {
                    let mut headers = HeaderMap::new();
                    if let Some(ct) = content_type {
                        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(*ct));
                    }
                    headers.insert(header::SET_COOKIE, HeaderValue::from_static("tracking=1"));
                    Ok(OriginResponse {
                        status: StatusCode::from_u16(*status).unwrap(),
                        headers,
                        body: Bytes::from_static(*body),
                    })
                }
                Some(Reply::Fail) | None => Err(FetchError::BodyTooLarge { limit: 0 }),
            }
        }
    }

    /// A store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn lookup(&self, _key: &CacheKey) -> Option<CachedResponse> {
            None
        }
        async fn put(&self, _key: CacheKey, _response: CachedResponse) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("disk full".into()))
        }
        fn entry_count(&self) -> usize {
            0
        }
    }

    fn retriever(fetcher: Arc<FakeFetcher>, store: Arc<dyn CacheStore>) -> Retriever {
        Retriever::new(store, fetcher, Url::parse(FALLBACK_URL).unwrap())
    }

    fn inbound(target: &str) -> Request<()> {
        Request::get(format!("/?url={}", target))
            .header("Host", "img.proxy.test")
            .body(())
            .unwrap()
    }

    fn assert_cacheable_shape(response: &CachedResponse, content_type: &str) {
        assert_eq!(response.headers.len(), 2);
        assert_eq!(response.headers[header::CONTENT_TYPE], content_type);
        assert_eq!(response.headers[header::CACHE_CONTROL], CACHE_CONTROL_VALUE);
    }

    #[tokio::test]
    async fn test_accepts_image_and_populates_cache() {
        let target = "https://example.com/cat.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(
            target,
            Reply::Ok(200, Some("image/png; charset=binary"), b"cat-bytes"),
        ));
        let store = Arc::new(MemoryCacheStore::new(16));
        let retriever = retriever(fetcher.clone(), store.clone());

        let request = inbound(target);
        let result = retriever.retrieve(&request, &Url::parse(target).unwrap()).await;

        assert_eq!(result.outcome, RetrievalOutcome::Fetched);
        assert_eq!(result.response.status, StatusCode::OK);
        assert_eq!(result.response.body, Bytes::from_static(b"cat-bytes"));
        assert_cacheable_shape(&result.response, "image/png");

        let cached = store.lookup(&CacheKey::from_request(&request)).await.unwrap();
        assert_eq!(cached, result.response);
        assert_eq!(fetcher.calls_to(FALLBACK_URL), 0);
    }

    #[tokio::test]
    async fn test_non_200_success_is_stored_as_200() {
        let target = "https://example.com/partial.png";
        let fetcher = Arc::new(
            FakeFetcher::default()
                .reply(target, Reply::Ok(206, Some("image/png"), b"part"))
                .reply("https://example.com/blank.png", Reply::Ok(204, Some("text/plain"), b""))
                .reply(FALLBACK_URL, Reply::Ok(203, Some("image/png"), FALLBACK_BYTES)),
        );
        let store = Arc::new(MemoryCacheStore::new(16));
        let retriever = retriever(fetcher, store.clone());

        let request = inbound(target);
        let fetched = retriever.retrieve(&request, &Url::parse(target).unwrap()).await;
        assert_eq!(fetched.outcome, RetrievalOutcome::Fetched);
        assert_eq!(fetched.response.status, StatusCode::OK);
        let cached = store.lookup(&CacheKey::from_request(&request)).await.unwrap();
        assert_eq!(cached.status, StatusCode::OK);

        let blank = "https://example.com/blank.png";
        let fallback = retriever.retrieve(&inbound(blank), &Url::parse(blank).unwrap()).await;
        assert!(matches!(fallback.outcome, RetrievalOutcome::Fallback(_)));
        assert_eq!(fallback.response.status, StatusCode::OK);
        assert_eq!(fallback.response.body, Bytes::from_static(FALLBACK_BYTES));
    }

    #[tokio::test]
    async fn test_second_request_is_a_pure_hit() {
        let target = "https://example.com/cat.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(
            target,
            Reply::Ok(200, Some("image/png"), b"cat-bytes"),
        ));
        let retriever = retriever(fetcher.clone(), Arc::new(MemoryCacheStore::new(16)));
        let url = Url::parse(target).unwrap();

        let first = retriever.retrieve(&inbound(target), &url).await;
        // Different caller headers, same URL.
        let mut again = inbound(target);
        again.headers_mut().insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        let second = retriever.retrieve(&again, &url).await;

        assert_eq!(second.outcome, RetrievalOutcome::Hit);
        assert_eq!(first.response, second.response);
        assert_eq!(fetcher.calls_to(target), 1);
    }

    #[tokio::test]
    async fn test_origin_error_status_serves_fallback() {
        let target = "https://broken.example/x.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(target, Reply::Ok(500, Some("image/png"), b"oops")));
        let store = Arc::new(MemoryCacheStore::new(16));
        let retriever = retriever(fetcher.clone(), store.clone());

        let request = inbound(target);
        let result = retriever.retrieve(&request, &Url::parse(target).unwrap()).await;

        assert_eq!(
            result.outcome,
            RetrievalOutcome::Fallback(FallbackReason::Status(StatusCode::INTERNAL_SERVER_ERROR))
        );
        assert_eq!(result.response.body, Bytes::from_static(FALLBACK_BYTES));
        assert_cacheable_shape(&result.response, "image/png");

        // The fallback is what got cached, and it now answers without network.
        let cached = store.lookup(&CacheKey::from_request(&request)).await.unwrap();
        assert_eq!(cached.body, Bytes::from_static(FALLBACK_BYTES));
        let repeat = retriever.retrieve(&request, &Url::parse(target).unwrap()).await;
        assert_eq!(repeat.outcome, RetrievalOutcome::Hit);
        assert_eq!(fetcher.calls_to(target), 1);
        assert_eq!(fetcher.calls_to(FALLBACK_URL), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_serves_fallback() {
        let target = "https://unreachable.example/x.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(target, Reply::Fail));
        let retriever = retriever(fetcher, Arc::new(MemoryCacheStore::new(16)));

        let result = retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;

        assert_eq!(result.outcome, RetrievalOutcome::Fallback(FallbackReason::Unreachable));
        assert_eq!(result.response.body, Bytes::from_static(FALLBACK_BYTES));
    }

    #[tokio::test]
    async fn test_html_is_rejected() {
        let target = "https://example.com/page";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(
            target,
            Reply::Ok(200, Some("text/html; charset=utf-8"), b"<html></html>"),
        ));
        let retriever = retriever(fetcher, Arc::new(MemoryCacheStore::new(16)));

        let result = retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;

        assert_eq!(
            result.outcome,
            RetrievalOutcome::Fallback(FallbackReason::DisallowedType("text/html".into()))
        );
        assert_eq!(result.response.body, Bytes::from_static(FALLBACK_BYTES));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_rejected() {
        let target = "https://example.com/blob";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(target, Reply::Ok(200, None, b"??")));
        let retriever = retriever(fetcher, Arc::new(MemoryCacheStore::new(16)));

        let result = retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;

        assert_eq!(
            result.outcome,
            RetrievalOutcome::Fallback(FallbackReason::DisallowedType(
                "application/octet-stream".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_fallback_unavailable_is_502_and_not_cached() {
        let target = "https://broken.example/x.png";
        let fetcher = Arc::new(
            FakeFetcher::default()
                .reply(target, Reply::Ok(404, None, b""))
                .reply(FALLBACK_URL, Reply::Ok(503, Some("text/plain"), b"down")),
        );
        let store = Arc::new(MemoryCacheStore::new(16));
        let retriever = retriever(fetcher.clone(), store.clone());

        let result = retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;

        assert_eq!(result.outcome, RetrievalOutcome::FallbackUnavailable);
        assert_eq!(result.response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(result.response.headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(store.entry_count(), 0);

        // Nothing cached, so the next attempt goes back to origin.
        retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;
        assert_eq!(fetcher.calls_to(target), 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_image() {
        let target = "https://example.com/cat.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(
            target,
            Reply::Ok(200, Some("image/png"), b"cat-bytes"),
        ));
        let retriever = retriever(fetcher, Arc::new(BrokenStore));

        let result = retriever.retrieve(&inbound(target), &Url::parse(target).unwrap()).await;

        assert_eq!(result.outcome, RetrievalOutcome::Fetched);
        assert_eq!(result.response.body, Bytes::from_static(b"cat-bytes"));
    }

    #[tokio::test]
    async fn test_unusable_cached_entry_is_refetched() {
        let target = "https://example.com/cat.png";
        let fetcher = Arc::new(FakeFetcher::with_fallback().reply(
            target,
            Reply::Ok(200, Some("image/png"), b"fresh"),
        ));
        let store = Arc::new(MemoryCacheStore::new(16));
        let request = inbound(target);
        let key = CacheKey::from_request(&request);

        let mut stale_headers = rewrite_headers(&HeaderMap::new());
        stale_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        store
            .put(key.clone(), CachedResponse::new(StatusCode::NOT_FOUND, stale_headers, Bytes::new()))
            .await
            .unwrap();

        let retriever = retriever(fetcher.clone(), store.clone());
        let result = retriever.retrieve(&request, &Url::parse(target).unwrap()).await;

        assert_eq!(result.outcome, RetrievalOutcome::Fetched);
        assert_eq!(store.lookup(&key).await.unwrap().status, StatusCode::OK);
        assert_eq!(fetcher.calls_to(target), 1);
    }

    #[tokio::test]
    async fn test_profile_headers_sent_to_known_origin_only() {
        let zhihu = "https://www.zhihu.com/pic/a.jpg";
        let other = "https://example.com/a.jpg";
        let fetcher = Arc::new(
            FakeFetcher::with_fallback()
                .reply(zhihu, Reply::Ok(200, Some("image/jpeg"), b"z"))
                .reply(other, Reply::Ok(200, Some("image/jpeg"), b"o")),
        );
        let retriever = retriever(fetcher.clone(), Arc::new(MemoryCacheStore::new(16)));

        retriever.retrieve(&inbound(zhihu), &Url::parse(zhihu).unwrap()).await;
        retriever.retrieve(&inbound(other), &Url::parse(other).unwrap()).await;

        let calls = fetcher.calls.lock().unwrap();
        let sent_to = |url: &str| calls.iter().find(|(u, _)| u == url).map(|(_, h)| h.clone()).unwrap();
        assert_eq!(sent_to(zhihu)[header::REFERER], "https://daily.zhihu.com");
        assert!(sent_to(other).is_empty());
    }
}
