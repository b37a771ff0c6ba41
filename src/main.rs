//! History Relay - Binary Entry Point

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use history_relay::config::{Cli, Command, Config, DatabaseConfig, DbCommand};
use history_relay::server;
use history_relay::store::{HistoryStore, PostgresHistoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "history_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Some(Command::Db(DbCommand::Init)) = cli.command {
        let url = cli
            .relay
            .database_url
            .clone()
            .context("DATABASE_URL is required for db init")?;
        let config = DatabaseConfig {
            url,
            max_connections: 1,
            acquire_timeout_secs: cli.relay.database_acquire_timeout_secs,
        };
        let store = PostgresHistoryStore::connect(&config)
            .await
            .context("failed to connect to PostgreSQL")?;
        store
            .init()
            .await
            .context("failed to initialize history schema")?;
        tracing::info!("history schema is ready");
        return Ok(());
    }

    let config = Config::from_args(&cli.relay).context("invalid configuration")?;
    server::run(config).await
}
