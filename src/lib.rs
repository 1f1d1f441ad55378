//! Edge image caching proxy library.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod origin;

pub use cache::{CacheKey, CacheStore, CachedResponse, MemoryCacheStore, Retriever};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
