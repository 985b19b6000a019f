use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use superclient::cli::{run_command, Cli};
use superclient::config::Config;
use superclient::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.command.is_some() {
        return run_command(&cli).await;
    }

    tracing::info!("Starting superclient v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    // Initialize database
    let db = superclient::db::init(&config.server.data_dir).await?;

    if cli.skip_checks {
        tracing::warn!("Skipping startup self-checks");
    } else {
        let report = superclient::startup::run_startup_checks(&config, &db).await;
        if !report.all_critical_passed {
            anyhow::bail!("Startup checks failed: {}", report.summary);
        }
    }

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), db.clone())?);

    superclient::api::rate_limit::spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );

    // Create API router
    let app = superclient::api::create_router(state.clone());

    // Start API server
    let api_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    superclient::db::close(&db).await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
