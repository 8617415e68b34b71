//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic merges
//! 3. Profile-specific config file (`config.{profile}.toml`)
//! 4. Main config file (`config.toml` / `parley.toml`)
//! 5. Environment variables (`PARLEY_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `PARLEY_` prefix with `__` as
//! separator:
//!
//! - `PARLEY_BOT__TOKEN=123:abc` → `bot.token = "123:abc"`
//! - `PARLEY_GENERAL__LOGGING=debug` → `general.logging = "debug"`
//! - `PARLEY_QUERY__REPLACE_QUERY=false` → `query.replace_query = false`
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_runtime::config::ConfigLoader;
//!
//! // Searches ./config, the current directory and the user config dir
//! let config = ConfigLoader::new().load()?;
//!
//! let config = ConfigLoader::new()
//!     .file("./config/config.toml")
//!     .profile("production")
//!     .load()?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use parley_framework::{DEFAULT_SEGMENT, LanguageTable};

use super::error::{ConfigError, ConfigResult};
use super::schema::ParleyConfig;
use super::validation::validate_config;

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `PARLEY_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("PARLEY_PROFILE")
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<ParleyConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: ParleyConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.general.logging,
            persistent_storage = config.general.persistent_storage,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ParleyConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with PARLEY_ prefix");
            figment = figment.merge(Env::prefixed("PARLEY_").split("__"));
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => Err(ConfigError::Parse(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("config"));
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("parley"));
        }
        paths
    }

    /// Merges the first config file found, preceded by its profile variant.
    #[cfg_attr(not(feature = "toml-config"), allow(unused_mut))]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        #[cfg(feature = "toml-config")]
        for search_path in self.resolve_search_paths() {
            for stem in ["config", "parley"] {
                let profile_path =
                    search_path.join(format!("{stem}.{}.toml", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = figment.merge(Toml::file(&profile_path));
                }

                let base_path = search_path.join(format!("{stem}.toml"));
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return figment.merge(Toml::file(&base_path));
                }
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path` plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().file(path).load()
}

/// Loads a language file: a table of locale segments, each mapping message
/// keys to templates. A `default` segment is required.
pub fn load_language_file<P: AsRef<Path>>(path: P) -> ConfigResult<LanguageTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    #[cfg(feature = "toml-config")]
    let figment = Figment::from(Toml::file(path));
    #[cfg(not(feature = "toml-config"))]
    let figment = Figment::new();

    let segments: HashMap<String, HashMap<String, String>> = figment.extract()?;
    let table = LanguageTable::new(segments);
    if !table.has_default_segment() {
        return Err(ConfigError::missing_field(format!(
            "{DEFAULT_SEGMENT} (in {})",
            path.display()
        )));
    }
    info!(path = %path.display(), "Language file loaded");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_sections_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "config.toml",
            r#"
            [bot]
            token = "123:abc"
            markup = "HTML"
            error_reply = "error"

            [general]
            logging = "debug"
            allowed_ids = [1, 2]

            [query]
            replace_query = false
            "#,
        );

        let config = ConfigLoader::new()
            .without_env()
            .file(&path)
            .load()
            .unwrap();
        assert_eq!(config.bot.token, "123:abc");
        assert_eq!(config.bot.markup, Some(parley_core::Markup::Html));
        assert_eq!(config.bot.cancel_command, "/cancel");
        assert_eq!(config.general.allowed_ids, Some(vec![1, 2]));
        assert!(!config.query.replace_query);
    }

    #[test]
    fn profile_file_is_found_next_to_the_base_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "config.toml", "[bot]\ntoken = \"base\"\n");
        write_file(
            dir.path(),
            "config.production.toml",
            "[bot]\ntoken = \"prod\"\nstrict_mode = true\n",
        );

        let config = ConfigLoader::new()
            .without_env()
            .search_path(dir.path())
            .profile("prod")
            .load()
            .unwrap();
        // The base file is merged last and wins.
        assert_eq!(config.bot.token, "base");
        assert!(config.bot.strict_mode);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/no/such/config.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn missing_token_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "config.toml", "[general]\nlogging = \"info\"\n");
        let err = ConfigLoader::new()
            .without_env()
            .file(&path)
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn language_file_needs_default_segment() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(
            dir.path(),
            "lang.toml",
            "[default]\ngreeting = \"Hello {}\"\n\n[de]\ngreeting = \"Hallo {}\"\n",
        );
        let table = load_language_file(&good).unwrap();
        assert_eq!(table.lookup("de_DE", "greeting"), Some("Hallo {}"));

        let bad = write_file(dir.path(), "bad.toml", "[de]\ngreeting = \"Hallo\"\n");
        assert!(matches!(
            load_language_file(&bad),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            load_language_file(dir.path().join("none.toml")),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn profile_names_are_normalised() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
