use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "imgcache-cli")]
#[command(about = "Client CLI for the image cache proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    proxy: String,

    #[arg(short, long, env = "IMGCACHE_API_TOKEN", hide_env_values = true, default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pre-populate the cache with an image
    Warm { url: String },
    /// Read an image through the proxy
    Fetch {
        url: String,
        /// Write the image body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Warm { url } => {
            // The proxy keys a write by its own URL, so the target also rides in the query.
            let res = client
                .post(&cli.proxy)
                .query(&[("url", url.as_str())])
                .json(&json!({ "url": url, "access_token": cli.token }))
                .send()
                .await?;
            print_status(res).await?;
        }
        Commands::Fetch { url, output } => {
            let res = client
                .get(&cli.proxy)
                .query(&[("url", url.as_str())])
                .send()
                .await?;
            print_image(res, output).await?;
        }
    }

    Ok(())
}

/// A non-success answer from the proxy.
#[derive(Debug, Error)]
#[error("proxy returned status {status}: {body}")]
struct ProxyError {
    status: StatusCode,
    body: String,
}

fn ensure_success(status: StatusCode, body: String) -> Result<String, ProxyError> {
    if status.is_success() {
        Ok(body)
    } else {
        Err(ProxyError { status, body })
    }
}

async fn print_status(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let body = ensure_success(status, res.text().await?)?;

    let json: Value = serde_json::from_str(&body)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_image(
    res: reqwest::Response,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let header = |name| {
        res.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    let content_type = header(CONTENT_TYPE);
    let cache_control = header(CACHE_CONTROL);
    let body = res.bytes().await?;

    println!("status:        {}", status);
    println!("content-type:  {}", content_type);
    println!("cache-control: {}", cache_control);
    println!("bytes:         {}", body.len());

    if let Some(path) = output {
        tokio::fs::write(&path, &body).await?;
        println!("saved to {}", path.display());
    }
    Ok(())
}
