use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scholar_mcp::config::{load_config, TransportMode};
use scholar_mcp::server::{run_http, run_line_transport, AppState, SessionManager, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "scholar-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server for federated scholarly search, ingestion, and citations", long_about = None)]
struct Args {
    /// Serve the line transport on stdio
    #[arg(long, default_value_t = false)]
    stdio: bool,

    /// Serve the HTTP transport
    #[arg(long, default_value_t = false)]
    http: bool,

    /// Port for the HTTP transport (overrides configuration)
    #[arg(long)]
    port: Option<u16>,

    /// Path to a configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("scholar_mcp={env_filter}")),
        ))
        // The line transport owns stdout; logs go to stderr.
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.http.port = port;
    }
    let transport = match (args.stdio, args.http) {
        (true, true) => TransportMode::Both,
        (true, false) => TransportMode::Line,
        (false, true) => TransportMode::Http,
        (false, false) => config.transport,
    };

    tracing::info!(version = scholar_mcp::VERSION, ?transport, "starting scholar-mcp");

    let core = scholar_mcp::build_core(&config)?;
    let engine = core.engine.clone();
    let registry = Arc::new(ToolRegistry::from_core(core));
    let sessions = Arc::new(SessionManager::new(
        Duration::from_millis(config.http.session_ttl_ms),
        config.http.max_sessions,
    ));
    let state = AppState {
        registry: registry.clone(),
        sessions,
        config: Arc::new(config.http.clone()),
    };

    match transport {
        TransportMode::Line => run_line_transport(registry).await?,
        TransportMode::Http => run_http(state).await?,
        TransportMode::Both => {
            let http = tokio::spawn(run_http(state));
            run_line_transport(registry).await?;
            http.abort();
        }
    }

    engine.shutdown();
    Ok(())
}
