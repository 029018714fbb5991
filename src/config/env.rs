//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `QBRIDGE_DISCORD_TOKEN` - Discord bot token
//! - `QBRIDGE_WHATSAPP_URL` - WhatsApp sidecar base URL
//! - `QBRIDGE_DATABASE_PATH` - SQLite database file

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "QBRIDGE";

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }

    if let Ok(url) = env::var(format!("{}_WHATSAPP_URL", ENV_PREFIX)) {
        config.whatsapp.sidecar_url = url;
    }

    if let Ok(path) = env::var(format!("{}_DATABASE_PATH", ENV_PREFIX)) {
        config.database.path = path;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `QBRIDGE_CONFIG` environment variable, otherwise returns "qbridge.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "qbridge.conf".to_string())
}
