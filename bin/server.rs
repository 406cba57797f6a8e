// Workshop Back-Office - Web Server
// REST API with Axum, one route set per resource

use anyhow::{Context, Result};
use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use workshop_backoffice::{open_database, router, AppState, Authenticator, Config, TokenAuthenticator};

/// Workshop back-office API server
#[derive(Parser, Debug)]
#[command(name = "backoffice-server", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Listen address (overrides the config)
    #[arg(long = "listen")]
    listen: Option<String>,
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let origins = config
        .allow_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid entry in allow_origins")?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    println!("🌐 Workshop Back-Office - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    println!("✓ Database opened: {}", config.database_path.display());

    if config.tokens.is_empty() {
        tracing::warn!("no tokens configured, every request will be rejected");
    }
    let auth: Arc<dyn Authenticator> = Arc::new(TokenAuthenticator::new(config.tokens.clone()));
    let state = AppState::new(conn, auth);

    let app = router(state)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;

    info!("listening on {}", config.listen_addr);
    println!("\n🚀 Server running on http://{}", config.listen_addr);
    println!("   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
