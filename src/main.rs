//! Minimal demonstration binary: loads a `GatewayConfig`, optionally runs
//! the `--setup` preflight, constructs a `Gateway`, and fetches one
//! caller-supplied URL.
//!
//! Grounded on `main.rs`'s tracing/env-filter setup and `--setup` flag
//! handling; the axum HTTP-server wiring is dropped entirely — the
//! Gateway *is* the HTTP client here, not an HTTP server. Its public API
//! is a library surface consumed in-process by scrapers, not exposed
//! over the network.

use tracing::{error, info};

use shadowgate::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();

    let config = match args.iter().position(|a| a == "--config") {
        Some(idx) => match args.get(idx + 1) {
            Some(path) => GatewayConfig::from_file(path),
            None => GatewayConfig::from_env(),
        },
        None => GatewayConfig::from_env(),
    };

    if args.iter().any(|a| a == "--setup") {
        let report = shadowgate::setup::check_all(&config.name, "https://example.com").await;
        println!("{report}");
        if report.has_failures() {
            info!("{}", report.summarize_for_logs());
        }
        return Ok(());
    }

    let gateway = Gateway::new(config)?;
    gateway.ensure_initialized().await;

    let Some(url) = args.iter().skip(1).find(|a| !a.starts_with("--")) else {
        eprintln!("usage: shadowgate <url> [--config <path>] [--setup]");
        return Ok(());
    };

    info!("fetching {}", url);
    match gateway.get_document(url, true).await {
        Some(doc) => {
            println!("status: {}", doc.status_code);
            println!("final url: {}", doc.url);
            println!("body ({} bytes):", doc.body.len());
            println!("{}", &doc.body[..doc.body.len().min(2000)]);
        }
        None => {
            error!("get_document({}) failed; see logs above for the reason", url);
        }
    }

    Ok(())
}
