/// Configuration management for the outreach engine
///
/// Handles server configuration, database location, engine pacing and mail relay settings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Interpreter pacing and tracking configuration
    pub engine: EngineConfig,
    /// Outbound mail relay configuration
    pub mailer: MailerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL (e.g., "sqlite://data/outreach.db")
    pub url: String,
}

/// Timings used by the per-campaign interpreter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause after an email send or a condition fallback
    pub send_cooldown_secs: u64,
    /// Pause when no sender has quota left
    pub capacity_backoff_secs: u64,
    /// Pause when the lead query fails
    pub fetch_backoff_secs: u64,
    /// Cron expression (with seconds) for the daily sender quota reset
    pub daily_reset_cron: String,
    /// Public base URL the open pixel and click redirects point at
    pub tracking_base_url: String,
}

/// Mail relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// HTTP relay endpoint; when absent, messages are only recorded in memory
    pub relay_url: Option<String>,
    /// Bearer token for the relay
    pub relay_token: Option<String>,
}

impl EngineConfig {
    pub fn send_cooldown(&self) -> Duration {
        Duration::from_secs(self.send_cooldown_secs)
    }

    pub fn capacity_backoff(&self) -> Duration {
        Duration::from_secs(self.capacity_backoff_secs)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_secs(self.fetch_backoff_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            send_cooldown_secs: env_or("OUTREACH_SEND_COOLDOWN_SECS", 60),
            capacity_backoff_secs: env_or("OUTREACH_CAPACITY_BACKOFF_SECS", 3600),
            fetch_backoff_secs: env_or("OUTREACH_FETCH_BACKOFF_SECS", 300),
            daily_reset_cron: std::env::var("OUTREACH_DAILY_RESET_CRON")
                .unwrap_or_else(|_| "0 0 0 * * *".to_string()),
            tracking_base_url: std::env::var("OUTREACH_TRACKING_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3004".to_string()),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("OUTREACH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("OUTREACH_PORT", 3004),
            },
            database: DatabaseConfig {
                url: std::env::var("OUTREACH_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/outreach.db".to_string()),
            },
            engine: EngineConfig::default(),
            mailer: MailerConfig {
                relay_url: std::env::var("OUTREACH_MAILER_URL").ok(),
                relay_token: std::env::var("OUTREACH_MAILER_TOKEN").ok(),
            },
        }
    }
}

/// Read and parse an environment variable, falling back on absence or parse failure
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
