use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::{info, warn};

use authz_server::{create_app, AuthzServer};
use error_common::{log_error, FreeflowError, Result};
use logger_redacted::init_tracing;

/// Freeflow authorization HTTP server
#[derive(Parser, Debug)]
#[command(name = "authz-server")]
#[command(about = "Relationship-based authorization HTTP API server")]
struct Args {
    /// Server bind address (overrides `server.host`)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides `server.port`)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file path (YAML or TOML)
    #[arg(short, long, env = "FREEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run(Args::parse()).await;
    if let Err(ref e) = result {
        log_error("authz-server", e).await;
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = config_engine::load(args.config.as_deref())
        .map_err(|e| FreeflowError::ConfigError(e.to_string()))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    init_tracing(&config.logging).map_err(|e| FreeflowError::ConfigError(e.to_string()))?;
    logger_redacted::set_redaction_enabled(config.logging.redaction_enabled);
    if !config.logging.redaction_enabled {
        warn!("PII redaction is disabled");
    }

    info!("🔐 {}", "Starting Freeflow authorization server".bright_cyan());
    info!("📋 Version: {}", env!("CARGO_PKG_VERSION").bright_white());
    info!("🗄️  Storage backend: {:?}", config.storage.backend);

    let server = AuthzServer::from_config(&config).await?;
    let app = create_app(server);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FreeflowError::NetworkError(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("🚀 {}", format!("Authorization server running on http://{}", addr).bright_green());
    info!("📋 {}", format!("Health check available at: http://{}/health", addr).bright_blue());
    info!("🔑 {}", format!("Permission endpoints: http://{}/api/auth/permissions", addr).bright_blue());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| FreeflowError::ServerError(format!("HTTP server error: {}", e)))?;

    info!("👋 {}", "Authorization server stopped".bright_yellow());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
