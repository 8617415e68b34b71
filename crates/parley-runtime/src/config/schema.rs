//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! token = "123:abc"
//! language_feature = true
//! error_reply = "error"
//!
//! [general]
//! logging = "info"
//! persistent_storage = true
//! storage_file = "db.json"
//!
//! [query]
//! replace_query = true
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::Markup;
use parley_framework::BotSettings;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Subscriber details; the level itself comes from `general.logging`.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ParleyConfig {
    /// The settings the dispatcher runs with.
    pub fn settings(&self) -> BotSettings {
        let bot = &self.bot;
        BotSettings {
            language_feature: bot.language_feature,
            implicit_routing: bot.implicit_routing,
            strict_mode: bot.strict_mode,
            mark_as_answer: bot.mark_as_answer,
            markup: bot.markup,
            error_reply: bot.error_reply.clone(),
            authorization_reply: bot.authorization_reply.clone(),
            extract_emojis: bot.extract_emojis,
            cancel_command: bot.cancel_command.clone(),
            max_history_entries: bot.max_history_entries,
            disable_web_preview: bot.disable_web_preview,
            disable_notification: bot.disable_notification,
            max_message_length: bot.max_message_length,
            replace_query: self.query.replace_query,
            allowed_ids: self.general.allowed_ids.clone(),
        }
    }

    /// The logging section completed with the level and log file of the
    /// `general` section.
    ///
    /// An explicit `general.logfile` sends the output to that file.
    pub fn effective_logging(&self) -> LoggingConfig {
        let mut logging = self.logging.clone();
        logging.level = self.general.logging;
        match &self.general.logfile {
            Some(path) => {
                logging.output = LogOutput::File;
                logging.file_path = Some(path.clone());
            }
            None if logging.output == LogOutput::File && logging.file_path.is_none() => {
                logging.file_path = Some(PathBuf::from(DEFAULT_LOGFILE));
            }
            None => {}
        }
        logging
    }

    /// Whether the language file has to be loaded.
    pub fn needs_language(&self) -> bool {
        self.bot.language_feature || self.bot.implicit_routing
    }
}

// =============================================================================
// [bot]
// =============================================================================

/// Platform credentials and dispatch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The platform credential.
    #[serde(default)]
    pub token: String,

    /// Seconds a session may stay idle before it is closed.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub language_feature: bool,

    #[serde(default)]
    pub implicit_routing: bool,

    #[serde(default)]
    pub strict_mode: bool,

    #[serde(default)]
    pub mark_as_answer: bool,

    #[serde(default)]
    pub markup: Option<Markup>,

    #[serde(default)]
    pub error_reply: Option<String>,

    #[serde(default)]
    pub authorization_reply: Option<String>,

    #[serde(default)]
    pub extract_emojis: bool,

    #[serde(default = "default_cancel_command")]
    pub cancel_command: String,

    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,

    #[serde(default)]
    pub disable_web_preview: bool,

    #[serde(default)]
    pub disable_notification: bool,

    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl BotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            timeout: default_timeout(),
            language_feature: false,
            implicit_routing: false,
            strict_mode: false,
            mark_as_answer: false,
            markup: None,
            error_reply: None,
            authorization_reply: None,
            extract_emojis: false,
            cancel_command: default_cancel_command(),
            max_history_entries: default_max_history_entries(),
            disable_web_preview: false,
            disable_notification: false,
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_timeout() -> u64 {
    31_536_000
}

fn default_cancel_command() -> String {
    "/cancel".to_string()
}

fn default_max_history_entries() -> usize {
    10
}

fn default_max_message_length() -> usize {
    4096
}

// =============================================================================
// [general]
// =============================================================================

const DEFAULT_LOGFILE: &str = "bot.log";

/// Process-wide options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub logging: LogLevel,

    /// Log file; when set, logs are written there.
    #[serde(default)]
    pub logfile: Option<PathBuf>,

    #[serde(default)]
    pub persistent_storage: bool,

    #[serde(default = "default_storage_file")]
    pub storage_file: PathBuf,

    /// Free-form options handed to custom storage initialisers.
    #[serde(default)]
    pub storage_args: Option<String>,

    /// Chats allowed to talk to the bot; absent means everyone.
    #[serde(default)]
    pub allowed_ids: Option<Vec<i64>>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            logging: LogLevel::default(),
            logfile: None,
            persistent_storage: false,
            storage_file: default_storage_file(),
            storage_args: None,
            allowed_ids: None,
        }
    }
}

impl GeneralConfig {
    /// `storage_args` split on whitespace.
    pub fn storage_args(&self) -> Vec<String> {
        self.storage_args
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

fn default_storage_file() -> PathBuf {
    PathBuf::from("db.json")
}

// =============================================================================
// [query]
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Rewrite a query prompt with the picked option.
    #[serde(default = "default_true")]
    pub replace_query: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            replace_query: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// [logging]
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    #[default]
    Error,
    /// Accepted for compatibility; logs like `error`.
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error | Self::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Tracing subscriber configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filled in from `general.logging`.
    #[serde(skip)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the log statement.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `parley_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_collect_all_sections() {
        let mut config = ParleyConfig::default();
        config.bot.error_reply = Some("oops".into());
        config.query.replace_query = false;
        config.general.allowed_ids = Some(vec![1, 2]);

        let settings = config.settings();
        assert_eq!(settings.error_reply.as_deref(), Some("oops"));
        assert!(!settings.replace_query);
        assert_eq!(settings.allowed_ids, Some(vec![1, 2]));
        assert_eq!(settings.cancel_command, "/cancel");
        assert_eq!(settings.max_history_entries, 10);
    }

    #[test]
    fn logfile_redirects_output() {
        let mut config = ParleyConfig::default();
        config.general.logging = LogLevel::Debug;
        assert_eq!(config.effective_logging().output, LogOutput::Stdout);

        config.general.logfile = Some(PathBuf::from("run.log"));
        let logging = config.effective_logging();
        assert_eq!(logging.level, LogLevel::Debug);
        assert_eq!(logging.output, LogOutput::File);
        assert_eq!(logging.file_path, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn file_output_defaults_to_bot_log() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert_eq!(
            config.effective_logging().file_path,
            Some(PathBuf::from("bot.log"))
        );
    }

    #[test]
    fn critical_logs_like_error() {
        assert_eq!("CRITICAL".parse::<LogLevel>(), Ok(LogLevel::Critical));
        assert_eq!(LogLevel::Critical.to_tracing_level(), tracing::Level::ERROR);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
