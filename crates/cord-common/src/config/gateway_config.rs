//! Gateway client configuration structs
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Tunables for the gateway session controller.
///
/// Every field has a default, so `GatewayConfig::default()` is a usable
/// configuration; `from_env` overrides from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Deadline for dialing and for each outbound websocket write, in
    /// milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Capacity of the dispatch event channel. Has to be at least 1 to make
    /// space for the first event (Ready or Resumed) without backpressuring
    /// the handshake.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Maximum reconnect attempts before the gateway gives up.
    #[serde(default = "default_reconnect_retries")]
    pub reconnect_retries: u32,

    /// Slack added to the server-provided heartbeat interval when computing
    /// the websocket read deadline, in milliseconds.
    #[serde(default = "default_extra_read_timeout_ms")]
    pub extra_read_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            event_buffer: default_event_buffer(),
            reconnect_retries: default_reconnect_retries(),
            extra_read_timeout_ms: default_extra_read_timeout_ms(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self {
            send_timeout_ms: env::var("GATEWAY_SEND_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_send_timeout_ms),
            event_buffer: env::var("GATEWAY_EVENT_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_event_buffer),
            reconnect_retries: env::var("GATEWAY_RECONNECT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_reconnect_retries),
            extra_read_timeout_ms: env::var("GATEWAY_EXTRA_READ_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_extra_read_timeout_ms),
        }
    }

    /// Per-write (and dial) deadline.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Read-deadline slack on top of the heartbeat interval.
    #[must_use]
    pub fn extra_read_timeout(&self) -> Duration {
        Duration::from_millis(self.extra_read_timeout_ms)
    }

    /// Event channel capacity, clamped to the required minimum of 1.
    #[must_use]
    pub fn event_buffer(&self) -> usize {
        self.event_buffer.max(1)
    }
}

/// Credentials for the runner binary.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot token used for Identify/Resume.
    pub token: String,
}

impl BotConfig {
    /// Load the bot token from the environment.
    ///
    /// # Errors
    /// Returns an error if `DISCORD_TOKEN` is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            token: env::var("DISCORD_TOKEN").map_err(|_| ConfigError::MissingVar("DISCORD_TOKEN"))?,
        })
    }
}

// Default value functions
fn default_send_timeout_ms() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    10
}

fn default_reconnect_retries() -> u32 {
    3
}

fn default_extra_read_timeout_ms() -> u64 {
    1_000
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
