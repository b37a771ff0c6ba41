//! Relay process wiring
//!
//! Builds every component once from configuration and hands the same
//! broadcaster to the consumer and to the HTTP layer.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::create_router;
use crate::api::websocket::{AppState, LiveBroadcaster};
use crate::bus::{EventBus, RedisBus};
use crate::config::{Config, ConsumerConfig, LiveConfig};
use crate::consumer::EventConsumer;
use crate::store::{HistoryStore, MemoryHistoryStore, PostgresHistoryStore};

/// Fully wired relay, ready to run
#[derive(Debug)]
pub struct Relay {
    pub store: Arc<dyn HistoryStore>,
    pub broadcaster: LiveBroadcaster,
    pub consumer: EventConsumer,
    pub router: Router,
}

impl Relay {
    /// Wire the components around an existing store and bus
    pub fn new(
        store: Arc<dyn HistoryStore>,
        bus: Arc<dyn EventBus>,
        consumer: ConsumerConfig,
        live: &LiveConfig,
    ) -> Self {
        let broadcaster = LiveBroadcaster::new(Arc::clone(&store), live);
        let consumer = EventConsumer::new(bus, Arc::clone(&store), broadcaster.clone(), consumer);
        let state = Arc::new(AppState::new(
            Arc::clone(&store),
            broadcaster.clone(),
            live.heartbeat_interval,
        ));

        Self {
            store,
            broadcaster,
            consumer,
            router: create_router(state),
        }
    }
}

/// Connect to the configured store, falling back to memory without `DATABASE_URL`
pub async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn HistoryStore>> {
    match &config.database {
        Some(database) => {
            let store = PostgresHistoryStore::connect(database)
                .await
                .context("failed to connect to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL is not set, history is kept in memory and lost on restart"
            );
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
    }
}

/// Run the relay until Ctrl-C or SIGTERM
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = connect_store(&config).await?;
    store.init().await.context("failed to initialize history schema")?;

    let bus: Arc<dyn EventBus> =
        Arc::new(RedisBus::open(&config.bus.url).context("invalid BUS_URL")?);

    let relay = Relay::new(store, bus, config.consumer.clone(), &config.live);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = tokio::spawn(relay.consumer.run(shutdown_rx));

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.server.host, config.server.port))?;
    let addr: SocketAddr = listener.local_addr()?;

    tracing::info!(%addr, topic = %config.consumer.topic, "history relay listening");

    axum::serve(listener, relay.router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = consumer.await {
        tracing::error!(error = %err, "event consumer task panicked");
    }

    tracing::info!("history relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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

    tracing::info!("shutdown signal received");
}
