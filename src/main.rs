use clap::Parser;
use tracing_subscriber::EnvFilter;

use pr_bubble_api::cli::{self, Cli};
use pr_bubble_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up DATABASE_URL, API_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    if let Err(e) = cli::run(cli, config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
