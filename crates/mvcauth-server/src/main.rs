//! mvcauth HTTP server binary.

use clap::Parser;
use mvcauth_server::{create_router, AppState, Args, ServerConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvcauth_server=info,mvcauth_core=info".into()),
        )
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    info!(
        listen = %config.listen_addr,
        config = ?args.config,
        "Starting mvcauth server"
    );

    // Resolve the authentication policy and open its backends
    let state = AppState::from_config(config.clone())?;
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
