//! Configuration management.
//!
//! Configuration comes from an optional TOML file, then environment
//! variables, then defaults:
//!
//! ```toml
//! read_preference = "secondary_preferred"
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/app/users.db"
//!
//! [logging]
//! level = "scoped_roles=debug"
//! format = "json"
//! file = "/var/log/app/roles.log"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::ReadPreference;
use crate::observability::{LogFormat, LoggingConfig};
use crate::services::DEFAULT_READ_PREFERENCE;
use crate::storage::StoreBackendType;
use crate::{Error, Result};

/// Environment variable selecting the store backend.
pub const ENV_STORE: &str = "SCOPED_ROLES_STORE";
/// Environment variable overriding the `SQLite` database path.
pub const ENV_DB_PATH: &str = "SCOPED_ROLES_DB_PATH";
/// Environment variable overriding the read preference.
pub const ENV_READ_PREFERENCE: &str = "SCOPED_ROLES_READ_PREFERENCE";
/// Environment variable overriding the log filter.
pub const ENV_LOG_LEVEL: &str = "SCOPED_ROLES_LOG_LEVEL";
/// Environment variable overriding the log format.
pub const ENV_LOG_FORMAT: &str = "SCOPED_ROLES_LOG_FORMAT";
/// Environment variable overriding the log file.
pub const ENV_LOG_FILE: &str = "SCOPED_ROLES_LOG_FILE";

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolesConfig {
    /// User store selection.
    pub store: StoreSettings,
    /// Read preference for lookups.
    pub read_preference: ReadPreference,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// User store selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSettings {
    /// Backend type.
    pub backend: StoreBackendType,
    /// Database path; the platform default when unset.
    pub path: Option<PathBuf>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            read_preference: DEFAULT_READ_PREFERENCE,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    read_preference: Option<String>,
    store: Option<ConfigFileStore>,
    logging: Option<ConfigFileLogging>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileStore {
    backend: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileLogging {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl RolesConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown backend, read preference, or log format.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or names an unknown
    /// backend, read preference, or log format.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Reads `scoped-roles/config.toml` under the platform config directory,
    /// falling back to defaults when it is missing or unreadable.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs
            .config_dir()
            .join("scoped-roles")
            .join("config.toml");
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Applies `SCOPED_ROLES_*` environment variables on top of this
    /// configuration.
    ///
    /// Unknown values are logged and ignored.
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    #[must_use]
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_STORE) {
            match StoreBackendType::parse(&raw) {
                Some(backend) => self.store.backend = backend,
                None => tracing::warn!(variable = ENV_STORE, value = %raw, "Unknown store backend"),
            }
        }
        if let Some(raw) = value(ENV_DB_PATH) {
            self.store.path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = value(ENV_READ_PREFERENCE) {
            match ReadPreference::parse(&raw) {
                Some(preference) => self.read_preference = preference,
                None => tracing::warn!(
                    variable = ENV_READ_PREFERENCE,
                    value = %raw,
                    "Unknown read preference"
                ),
            }
        }
        if let Some(raw) = value(ENV_LOG_LEVEL) {
            self.logging.level = raw;
        }
        if let Some(raw) = value(ENV_LOG_FORMAT) {
            match LogFormat::parse(&raw) {
                Some(format) => self.logging.format = format,
                None => tracing::warn!(variable = ENV_LOG_FORMAT, value = %raw, "Unknown log format"),
            }
        }
        if let Some(raw) = value(ENV_LOG_FILE) {
            self.logging.file = Some(PathBuf::from(raw));
        }

        self
    }

    /// Uses the in-memory store.
    #[must_use]
    pub fn with_memory_store(mut self) -> Self {
        self.store = StoreSettings {
            backend: StoreBackendType::Memory,
            path: None,
        };
        self
    }

    /// Uses a `SQLite` store at `path`.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = StoreSettings {
            backend: StoreBackendType::Sqlite,
            path: Some(path.into()),
        };
        self
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = file.read_preference {
            config.read_preference = ReadPreference::parse(&raw)
                .ok_or_else(|| Error::InvalidInput(format!("unknown read preference: {raw}")))?;
        }
        if let Some(store) = file.store {
            if let Some(raw) = store.backend {
                config.store.backend = StoreBackendType::parse(&raw)
                    .ok_or_else(|| Error::InvalidInput(format!("unknown store backend: {raw}")))?;
            }
            config.store.path = store.path.map(PathBuf::from);
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(raw) = logging.format {
                config.logging.format = LogFormat::parse(&raw)
                    .ok_or_else(|| Error::InvalidInput(format!("unknown log format: {raw}")))?;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }
}
