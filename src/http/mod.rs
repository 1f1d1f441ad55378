//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware)
//!     → handlers.rs (method dispatch)
//!     → request.rs (extract target URL, authenticate writes)
//!     → cache::Retriever (lookup, fetch, fallback, populate)
//!     → response.rs (rejections, write envelope)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuidV4, RequestError, WarmRequest, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
