//! Application configuration.
//!
//! Configuration is a single YAML file, parsed and validated once at startup.
//! The resulting [`Config`] is immutable and passed explicitly into every
//! component constructor; there is no process-global configuration state.
//!
//! Missing or invalid fields are fatal: [`Config::load`] returns an error
//! naming the offending field, and the binaries exit.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub nostr: NostrConfig,
    pub chat: ChatConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub port: String,
    pub sslmode: String,
}

/// Relay connection and event scoping settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NostrConfig {
    /// Relay websocket URL (e.g. `wss://relay.example.com`).
    pub relay_url: String,
    /// Value of the `s` tag scoping this deployment's traffic.
    pub session: String,
    /// Value of the `p` tag; hex public key of this machine.
    pub machine_pubkey: String,
    /// Secret key used to sign published events (hex or bech32).
    pub secret_key: String,
}

/// Upstream chat API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub api_key: String,
    /// Per-conversation ceiling on accumulated usage tokens.
    pub max_context_tokens: u64,
}

/// Bearer-token authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing session tokens.
    pub secret: String,
    /// Token lifetime in hours.
    pub exp_hour: i64,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

impl DatabaseConfig {
    /// Render the PostgreSQL connection string.
    pub fn dsn(&self) -> String {
        format!(
            "host={} user={} password={} dbname={} port={} sslmode={}",
            self.host, self.user, self.password, self.dbname, self.port, self.sslmode,
        )
    }
}

impl Config {
    /// Read and validate the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        require(&self.database.host, "database.host")?;
        require(&self.database.user, "database.user")?;
        require(&self.database.password, "database.password")?;
        require(&self.database.dbname, "database.dbname")?;
        require(&self.database.port, "database.port")?;
        require(&self.database.sslmode, "database.sslmode")?;
        require(&self.nostr.relay_url, "nostr.relay_url")?;
        require(&self.nostr.session, "nostr.session")?;
        require(&self.nostr.machine_pubkey, "nostr.machine_pubkey")?;
        require(&self.nostr.secret_key, "nostr.secret_key")?;
        require(&self.chat.api_key, "chat.api_key")?;
        require(&self.auth.secret, "auth.secret")?;

        if self.chat.max_context_tokens < 1 {
            return Err(Error::Config {
                field: "chat.max_context_tokens",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.auth.exp_hour < 1 {
            return Err(Error::Config {
                field: "auth.exp_hour",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.port == 0 {
            return Err(Error::Config {
                field: "server.port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }

        Ok(())
    }
}

fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::required(field));
    }
    Ok(())
}
