//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (metrics exporter, signal listener)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use std::net::{AddrParseError, SocketAddr};

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::metrics;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid {field}: {source}")]
    Address {
        field: &'static str,
        #[source]
        source: AddrParseError,
    },

    #[error("metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Server(#[from] ServerError),
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value
        .parse()
        .map_err(|source| StartupError::Address { field, source })
}

/// Bring the proxy up and serve until a termination signal arrives.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        fallback = %config.fallback.image_url,
        origin_timeout_secs = config.timeouts.origin_secs,
        cache_max_entries = config.cache.max_entries,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
        metrics::init_metrics(addr)?;
    }

    let bind_addr = parse_addr("listener.bind_address", &config.listener.bind_address)?;
    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_listener(shutdown);

    match tls {
        Some(tls) => server.run_tls(bind_addr, &tls, server_shutdown).await?,
        None => {
            let listener = TcpListener::bind(bind_addr)
                .await
                .map_err(|source| StartupError::Bind { addr: bind_addr, source })?;
            server
                .run(listener, server_shutdown)
                .await
                .map_err(ServerError::from)?;
        }
    }

    Ok(())
}
