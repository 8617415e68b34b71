//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, GeneralConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_general_config(&config.general)?;
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.token.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }

    if bot.timeout == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }

    if bot.max_history_entries == 0 {
        return Err(ConfigError::validation(
            "max_history_entries must be at least 1",
        ));
    }

    if bot.max_message_length == 0 {
        return Err(ConfigError::validation(
            "max_message_length must be at least 1",
        ));
    }

    if bot.cancel_command.is_empty() {
        return Err(ConfigError::validation("cancel_command cannot be empty"));
    }

    Ok(())
}

fn validate_general_config(general: &GeneralConfig) -> ConfigResult<()> {
    if general.persistent_storage && general.storage_file.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("general.storage_file"));
    }
    Ok(())
}
