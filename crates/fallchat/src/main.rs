use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fallchat::config::Config;
use fallchat::server::{self, AppState};

/// Chat completion server with ordered provider fallback.
#[derive(Parser)]
#[command(name = "fallchat", version, about)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "fallchat.yaml")]
    config: PathBuf,

    /// Bind address (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides config and PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    config.override_port(std::env::var("PORT").ok().as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let state = AppState::from_config(&config, client);
    info!(
        providers = state.catalog.providers().len(),
        models = state.catalog.models().len(),
        "Catalog loaded"
    );

    let probe = state.probe.clone();
    tokio::spawn(async move {
        let set = probe.probe().await;
        if set.is_empty() {
            warn!("No providers passed the startup probe");
        }
    });

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
