//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all core settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Listener configuration (host, port)
    pub server: ServerSettings,

    /// Reactor thread pool configuration
    pub reactor: ReactorSettings,

    /// Per-session limits
    pub session: SessionSettings,

    /// Downstream RPC client pools
    pub rpc: RpcSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Listener binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Reactor thread pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactorSettings {
    /// Number of reactor threads; 0 means one per hardware core
    pub workers: usize,
}

/// Per-session limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Maximum queued outbound frames before a slow consumer is disconnected
    pub max_send_queue: usize,
}

/// Downstream RPC pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// Downstream service instances to keep a client pool for
    #[serde(default)]
    pub endpoints: Vec<RpcEndpoint>,

    /// Client handles pooled per endpoint
    pub pool_size: usize,
}

/// Address of one downstream service instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpoint {
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("reactor.workers", 0)?
            .set_default("session.max_send_queue", 1000)?
            .set_default("rpc.pool_size", 4)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=8090 -> server.port = 8090
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .build()?
            .try_deserialize()
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerSettings {
    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid server address configuration")
    }
}

impl ReactorSettings {
    /// Worker count with 0 resolved to the host's hardware concurrency.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
