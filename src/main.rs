//! Edge image caching proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────────┐
//!                  │                 IMAGE CACHE PROXY                  │
//!                  │                                                    │
//!  GET ?url=...    │  ┌─────────┐    ┌──────────┐    ┌──────────────┐   │
//!  POST {url,token}┼─▶│  http   │───▶│ handlers │───▶│  retriever   │   │
//!                  │  │ server  │    │ dispatch │    │ cache-aside  │   │
//!                  │  └─────────┘    └──────────┘    └──┬────────┬──┘   │
//!                  │                                    │        │      │
//!                  │                          ┌─────────▼─┐  ┌───▼────┐ │
//!                  │                          │   cache   │  │ origin │─┼──▶ Origin /
//!                  │                          │   store   │  │fetcher │ │    Fallback
//!                  │                          └───────────┘  └────────┘ │
//!                  │                                                    │
//!                  │   config  ·  observability  ·  lifecycle           │
//!                  └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use image_cache_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig};
use image_cache_proxy::lifecycle::startup;
use image_cache_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "image-cache-proxy")]
#[command(about = "Edge caching proxy for remote images", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "IMGCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long, env = "IMGCACHE_BIND")]
    bind: Option<String>,

    /// Override auth.api_token.
    #[arg(long, env = "IMGCACHE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Override fallback.image_url.
    #[arg(long, env = "IMGCACHE_FALLBACK_URL")]
    fallback_url: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(token) = self.api_token {
            config.auth.api_token = token;
        }
        if let Some(url) = self.fallback_url {
            config.fallback.image_url = url;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability);
    tracing::info!("image-cache-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
