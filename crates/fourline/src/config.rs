//! Server configuration.
//!
//! Loaded from an optional TOML file, then overridden from the command line
//! (`--listen`, `--database-url` / `DATABASE_URL`). Every section and field
//! has a default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [matchmaking]
//! bot_timeout_ms = 10000
//! bot_move_delay_ms = 400
//!
//! [delivery]
//! capacity = 64
//! overflow = "disconnect"   # or "drop"
//!
//! [event_log]
//! enabled = true
//! topic = "game-events"
//!
//! [database]
//! url = "postgres://localhost/fourline"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fourline_coordinator::{CoordinatorConfig, OverflowPolicy};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root configuration, as read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub matchmaking: MatchmakingSettings,
    pub delivery: DeliverySettings,
    pub event_log: EventLogSettings,
    pub database: DatabaseSettings,
}

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// The address and port to listen on.
    pub listen: SocketAddr,
    /// Milliseconds a new socket gets to finish the WebSocket upgrade.
    pub handshake_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            handshake_timeout_ms: 5_000,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// `[matchmaking]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Milliseconds a lone player waits before facing the automated opponent.
    pub bot_timeout_ms: u64,
    /// Milliseconds the automated opponent pauses before answering.
    pub bot_move_delay_ms: u64,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            bot_timeout_ms: 10_000,
            bot_move_delay_ms: 400,
        }
    }
}

/// `[delivery]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Outbound events buffered per connection.
    pub capacity: usize,
    /// What happens when that buffer is full.
    pub overflow: OverflowPolicy,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            capacity: 64,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// `[event_log]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventLogSettings {
    pub enabled: bool,
    pub topic: String,
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: "game-events".to_owned(),
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres connection string. Finished games are only logged without it.
    pub url: Option<String>,
}

impl ServerConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks values serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.handshake_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "server.handshake_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.delivery.capacity == 0 {
            return Err(ConfigError::Validation(
                "delivery.capacity must be greater than 0".into(),
            ));
        }
        if self.event_log.enabled && self.event_log.topic.trim().is_empty() {
            return Err(ConfigError::Validation(
                "event_log.topic must not be empty".into(),
            ));
        }
        if let Some(url) = &self.database.url {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "database.url must not be empty when set".into(),
                ));
            }
        }
        Ok(())
    }

    /// How long an accepted socket may take to complete the upgrade.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.server.handshake_timeout_ms)
    }

    /// The part of the configuration the coordinator cares about.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            bot_timeout: Duration::from_millis(self.matchmaking.bot_timeout_ms),
            bot_move_delay: Duration::from_millis(self.matchmaking.bot_move_delay_ms),
            event_topic: self.event_log.topic.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Reads the file (if any), applies command-line overrides, validates.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    listen_override: Option<SocketAddr>,
    database_url_override: Option<String>,
}

impl ConfigLoader {
    pub fn new(config_path: Option<&Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.map(Path::to_path_buf),
            listen_override,
            database_url_override: None,
        }
    }

    pub fn database_url(mut self, url: Option<String>) -> Self {
        self.database_url_override = url;
        self
    }

    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config_path {
            Some(path) => ServerConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };

        if let Some(listen) = self.listen_override {
            config.server.listen = listen;
        }
        if let Some(url) = &self.database_url_override {
            config.database.url = Some(url.clone());
        }

        config.validate()?;
        Ok(config)
    }
}
