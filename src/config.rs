//! Configuration for the relay.
//!
//! Every setting can come from a flag or from the environment; a `.env`
//! file in the working directory is loaded before parsing.

use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "history-relay", version)]
#[command(about = "Persists classification results from the bus and streams them to live viewers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub relay: RelayArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Create the history table if needed and exit
    Init,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RelayArgs {
    /// PostgreSQL connection string; entries are kept in memory when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, env = "DATABASE_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub database_acquire_timeout_secs: u64,

    /// Redis connection string for the event bus
    #[arg(long, env = "BUS_URL")]
    pub bus_url: Option<String>,

    /// Topic carrying classification results
    #[arg(long, env = "BUS_TOPIC", default_value = "classification-results")]
    pub bus_topic: String,

    /// Base location that entry ids are appended to when building source refs
    #[arg(long, env = "SOURCE_BASE_URL")]
    pub source_base_url: Option<String>,

    /// Server host
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Delay before resubscribing after the bus connection drops
    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Interval between server pings on live connections
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Number of entries sent to a live connection when it opens
    #[arg(long, env = "SNAPSHOT_SIZE", default_value_t = 50)]
    pub snapshot_size: i64,
}

/// Errors raised while turning arguments into a [`Config`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Validated relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub bus: BusConfig,
    pub server: ServerConfig,
    pub consumer: ConsumerConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings for the bus consumer loop
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    /// Base that entry ids are joined onto to form `source_ref`
    pub source_base: Url,
    pub reconnect_delay: Duration,
}

impl ConsumerConfig {
    pub const DEFAULT_TOPIC: &'static str = "classification-results";
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

    /// Default topic and retry delay for the given base location
    pub fn new(source_base: Url) -> Self {
        Self {
            topic: Self::DEFAULT_TOPIC.to_string(),
            source_base,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Settings for live connections
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub snapshot_size: i64,
    pub heartbeat_interval: Duration,
    /// Updates queued per connection before new ones are dropped
    pub connection_buffer: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            snapshot_size: crate::types::DEFAULT_LIMIT,
            heartbeat_interval: Duration::from_secs(30),
            connection_buffer: 256,
        }
    }
}

impl Config {
    /// Validate parsed arguments.
    pub fn from_args(args: &RelayArgs) -> Result<Self, ConfigError> {
        let database = args.database_url.as_ref().map(|url| DatabaseConfig {
            url: url.clone(),
            max_connections: args.database_max_connections.max(1),
            acquire_timeout_secs: args.database_acquire_timeout_secs,
        });

        let bus_url = args
            .bus_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("BUS_URL"))?;

        let source_base = parse_source_base(
            args.source_base_url
                .as_deref()
                .ok_or(ConfigError::Missing("SOURCE_BASE_URL"))?,
        )?;

        if args.reconnect_delay_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RECONNECT_DELAY_SECS",
                message: "must be at least one second".to_string(),
            });
        }

        if args.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HEARTBEAT_INTERVAL_SECS",
                message: "must be at least one second".to_string(),
            });
        }

        Ok(Self {
            database,
            bus: BusConfig { url: bus_url },
            server: ServerConfig {
                host: args.host.clone(),
                port: args.port,
            },
            consumer: ConsumerConfig::new(source_base)
                .with_topic(args.bus_topic.clone())
                .with_reconnect_delay(Duration::from_secs(args.reconnect_delay_secs)),
            live: LiveConfig {
                snapshot_size: crate::types::normalize_limit(args.snapshot_size),
                heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
                ..LiveConfig::default()
            },
        })
    }
}

/// Parse the base location used for `source_ref`.
pub fn parse_source_base(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: "SOURCE_BASE_URL",
        message: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidValue {
            key: "SOURCE_BASE_URL",
            message: "must be a hierarchical URL such as https://host/path".to_string(),
        });
    }

    Ok(url)
}
