//! Configuration loaded from environment variables.

mod gateway_config;

pub use gateway_config::{BotConfig, ConfigError, GatewayConfig};
