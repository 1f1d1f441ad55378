//! Cache-aside image retrieval subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request + target URL
//!     → key.rs (CacheKey from the request URL)
//!     → store.rs / memory.rs (lookup)
//!     → retriever.rs (origin fetch, validation, fallback)
//!     → mime.rs (content-type normalization, image allow-list)
//!     → rewrite.rs (content-type + cache-control only)
//!     → store.rs / memory.rs (put)
//! ```

pub mod key;
pub mod memory;
pub mod mime;
pub mod retriever;
pub mod rewrite;
pub mod store;

pub use key::CacheKey;
pub use memory::MemoryCacheStore;
pub use mime::{normalize_content_type, ALLOWED_MIME_TYPES, DEFAULT_CONTENT_TYPE};
pub use retriever::{FallbackReason, Retrieval, RetrievalOutcome, Retriever};
pub use rewrite::{rewrite_headers, CACHE_CONTROL_VALUE, CACHE_MAX_AGE_SECS};
pub use store::{CacheError, CacheStore, CachedResponse};
