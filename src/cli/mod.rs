use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use crate::app::{build_router, AppState};
use crate::config::{AppConfig, Environment};
use crate::database::{DatabaseManager, PgPrBubbleRepository};

#[derive(Parser)]
#[command(name = "pr-bubble-api")]
#[command(about = "PR bubble management API for the chat-bot digest pipeline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Bind address, overrides HOST")]
        host: Option<String>,

        #[arg(long, help = "Listen port, overrides PORT")]
        port: Option<u16>,
    },

    #[command(about = "Apply database migrations and exit")]
    Migrate,
}

pub async fn run(cli: Cli, mut config: AppConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Migrate => {
            let db = DatabaseManager::connect_lazy(&config.database)?;
            db.migrate().await?;
            db.close().await;
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting PR Bubble API in {:?} mode", config.environment);
    warn_on_weak_settings(&config);

    let db = DatabaseManager::connect_lazy(&config.database)?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let repo = Arc::new(PgPrBubbleRepository::new(db.pool().clone()));
    let state = AppState::new(config, repo)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

fn warn_on_weak_settings(config: &AppConfig) {
    if config.environment != Environment::Development && config.security.secret_key == "change-me-in-production" {
        tracing::warn!("SECRET_KEY is still the default value");
    }
    if config.auth.bot_api_key.is_empty() {
        tracing::warn!("API_KEY is not set; bot endpoints will reject every request");
    }
    if !config.auth.access_configured() {
        if config.auth.dev_bypass {
            tracing::warn!("Cloudflare Access dev bypass is ON; admin endpoints are open");
        } else {
            tracing::warn!("Cloudflare Access is not configured; admin endpoints will reject every request");
        }
    }
    if !config.storage.has_credentials() {
        tracing::warn!("R2 credentials are not set; image uploads will fail");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
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
