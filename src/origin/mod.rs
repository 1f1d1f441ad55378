//! Origin access subsystem.
//!
//! # Data Flow
//! ```text
//! target URL
//!     → profiles.rs (browser headers for the target host)
//!     → fetcher.rs (GET with timeouts and a body cap)
//!     → OriginResponse (status, headers, buffered body)
//! ```

pub mod fetcher;
pub mod profiles;

pub use fetcher::{FetchError, HttpOriginFetcher, OriginFetcher, OriginResponse};
pub use profiles::{headers_for, BrowserProfile};

use url::Url;

/// The `host[:port]` of a URL, with default ports omitted.
pub fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}
