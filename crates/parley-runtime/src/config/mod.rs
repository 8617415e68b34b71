//! Configuration for the parley runtime.
//!
//! Settings are read from TOML files and `PARLEY_*` environment variables
//! through figment, validated, and turned into the framework's
//! [`BotSettings`](parley_framework::BotSettings).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file, load_language_file};
pub use schema::{
    BotConfig, GeneralConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ParleyConfig,
    QueryConfig, SpanEventConfig,
};
pub use validation::validate_config;
