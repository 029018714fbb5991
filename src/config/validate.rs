//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;

const WEBHOOK_PREFIXES: [&str; 3] = [
    "https://discord.com/api/webhooks/",
    "https://discordapp.com/api/webhooks/",
    "https://canary.discord.com/api/webhooks/",
];

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Validate Discord config
    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }

    // Validate sidecar
    let url = &config.whatsapp.sidecar_url;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(format!(
            "whatsapp.sidecar_url '{}' must be an http(s) URL",
            url
        ));
    }

    if config.database.path.is_empty() {
        errors.push("database.path is required".to_string());
    }

    // Validate limits
    if config.limits.discord_message_length == 0 {
        errors.push("limits.discord_message_length must be non-zero".to_string());
    }
    if config.limits.discord_attachment_bytes == 0 {
        errors.push("limits.discord_attachment_bytes must be non-zero".to_string());
    }
    if config.limits.reply_preview_length == 0 {
        errors.push("limits.reply_preview_length must be non-zero".to_string());
    }

    // Validate channel pairings
    let mut seen = HashSet::new();
    for (i, pairing) in config.channels.iter().enumerate() {
        if pairing.discord.is_empty() {
            errors.push(format!("channels[{}].discord is required", i));
        } else if pairing.discord.parse::<u64>().is_err() {
            errors.push(format!(
                "channels[{}].discord '{}' is not a Discord channel ID",
                i, pairing.discord
            ));
        }
        if pairing.whatsapp.is_empty() {
            errors.push(format!("channels[{}].whatsapp is required", i));
        }
        if !WEBHOOK_PREFIXES
            .iter()
            .any(|prefix| pairing.webhook.starts_with(prefix))
        {
            errors.push(format!(
                "channels[{}].webhook is not a Discord webhook URL",
                i
            ));
        }
        if !seen.insert(pairing.discord.as_str()) {
            errors.push(format!(
                "channels[{}].discord '{}' is paired more than once",
                i, pairing.discord
            ));
        }
    }

    if config.channels.is_empty() {
        errors.push("channels is empty - nothing to bridge".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_valid_config() -> Config {
        Config {
            discord: DiscordConfig {
                token: "valid_token_here".to_string(),
                disambiguate_usernames: false,
            },
            whatsapp: WhatsAppConfig::default(),
            database: DatabaseConfig::default(),
            attachment_icons: AttachmentIcons::default(),
            limits: LimitsConfig::default(),
            channels: vec![ChannelPairing {
                discord: "987654321".to_string(),
                whatsapp: "120363@g.us".to_string(),
                webhook: "https://discord.com/api/webhooks/1/abc".to_string(),
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_token_fails() {
        let mut config = make_valid_config();
        config.discord.token = String::new();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("discord.token"));
    }

    #[test]
    fn test_placeholder_token_fails() {
        let mut config = make_valid_config();
        config.discord.token = "YOUR_DISCORD_TOKEN_HERE".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("placeholder"));
    }

    #[test]
    fn test_bad_webhook_fails() {
        let mut config = make_valid_config();
        config.channels[0].webhook = "https://example.com/hook".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("webhook"));
    }

    #[test]
    fn test_duplicate_pairing_fails() {
        let mut config = make_valid_config();
        config.channels.push(config.channels[0].clone());

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_zero_limit_fails() {
        let mut config = make_valid_config();
        config.limits.discord_message_length = 0;

        let result = validate_config(&config);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("discord_message_length"));
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = make_valid_config();
        config.discord.token = String::new();
        config.whatsapp.sidecar_url = "sidecar:3001".to_string();
        config.channels[0].discord = "general".to_string();

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("discord.token"));
        assert!(message.contains("sidecar_url"));
        assert!(message.contains("not a Discord channel ID"));
    }
}
