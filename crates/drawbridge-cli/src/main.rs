use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use drawbridge_core::config::Config;
use drawbridge_gateway::{CanvasClient, GatewayState, ReconnectPolicy};

mod logging;

#[derive(Parser)]
#[command(
    name = "drawbridge",
    about = "Shared drawing canvas hub with agent streaming",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the canvas hub and HTTP API
    Serve {
        /// HTTP port (default: 3000)
        #[arg(long)]
        port: Option<u16>,

        /// Canvas WebSocket port (default: 3001)
        #[arg(long)]
        ws_port: Option<u16>,
    },
    /// Connect to a running hub and print canvas frames
    Watch {
        /// Canvas WebSocket URL
        #[arg(long)]
        url: Option<String>,

        /// Delay between reconnect attempts in milliseconds
        #[arg(long, default_value_t = 3000)]
        retry_delay_ms: u64,

        /// Give up after this many consecutive failed attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show status of a running hub
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(config.logging.as_ref(), cli.verbose);

    match cli.command {
        Commands::Serve { port, ws_port } => serve(config, port, ws_port).await?,
        Commands::Watch {
            url,
            retry_delay_ms,
            max_attempts,
        } => {
            let url = url.unwrap_or_else(|| local_ws_url(&config));
            let policy = ReconnectPolicy {
                delay: Duration::from_millis(retry_delay_ms),
                max_attempts,
            };
            watch(url, policy).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
        },
        Commands::Status => status(&config, &config_path).await,
    }

    Ok(())
}

async fn serve(config: Config, port: Option<u16>, ws_port: Option<u16>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("config: {warning}");
    }
    if !errors.is_empty() {
        for error in &errors {
            tracing::error!("config: {error}");
        }
        bail!("invalid configuration ({} errors)", errors.len());
    }

    let port = port.unwrap_or_else(|| config.gateway_port());
    let ws_port = ws_port.unwrap_or_else(|| config.ws_port());
    if port == ws_port {
        bail!("HTTP and canvas ports must differ (both {port})");
    }

    tracing::info!("Starting Drawbridge v{} (http {port}, canvas {ws_port})", env!("CARGO_PKG_VERSION"));
    let state = Arc::new(GatewayState::from_config(config).await?);
    drawbridge_gateway::start_gateway(state, port, ws_port).await
}

async fn watch(url: String, policy: ReconnectPolicy) -> anyhow::Result<()> {
    let client = CanvasClient::new(url, policy);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    client
        .run(
            |frame| match serde_json::to_string(&frame) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(%e, "Failed to render frame"),
            },
            cancel,
        )
        .await
}

async fn status(config: &Config, config_path: &std::path::Path) {
    println!("Drawbridge v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", config_path.display());
    println!("HTTP port: {}", config.gateway_port());
    println!("Canvas endpoint: {}", config.public_ws_url());

    let base = format!("http://127.0.0.1:{}", config.gateway_port());
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(3)).build() {
        Ok(client) => client,
        Err(e) => {
            println!("Status: unknown ({e})");
            return;
        }
    };
    match fetch_json(&client, &format!("{base}/api/canvas")).await {
        Ok(canvas) => {
            println!("Status: {}", canvas["status"].as_str().unwrap_or("unknown"));
            println!("Clients: {}", canvas["clients"]);
            println!("Elements: {}", canvas["elementsCount"]);
        }
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "Status request failed");
            println!("Status: not running");
        }
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> anyhow::Result<serde_json::Value> {
    Ok(client.get(url).send().await?.error_for_status()?.json().await?)
}

/// URL for connecting from this machine: the advertised endpoint if one is
/// configured, loopback otherwise.
fn local_ws_url(config: &Config) -> String {
    match config.gateway.as_ref().and_then(|g| g.public_ws_url.clone()) {
        Some(url) => url,
        None => format!("ws://127.0.0.1:{}", config.ws_port()),
    }
}
