//! Server configuration.
//!
//! Read from `lahendus.json` in camelCase. Every field has a default, so a
//! missing file or a partial document is fine.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "lahendus.json";

/// Database path that opens a fresh in-memory database.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_database() -> String {
    "lahendus.db".to_string()
}

fn default_app_name() -> String {
    "Lahendus".to_string()
}

const fn default_true() -> bool {
    true
}

/// Configuration for the Lahendus server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,

    /// Whether to insert the demo course on startup.
    #[serde(default)]
    pub seed_demo_data: bool,

    /// Application name shown in page titles.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Whether to answer CORS requests from any origin.
    #[serde(default = "default_true")]
    pub cors_allow_all: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            seed_demo_data: false,
            app_name: default_app_name(),
            cors_allow_all: true,
        }
    }
}

impl Config {
    /// Configuration for tests: in-memory database with the demo course.
    #[must_use]
    pub fn in_memory_demo() -> Self {
        Self {
            database: IN_MEMORY_DATABASE.to_string(),
            seed_demo_data: true,
            ..Self::default()
        }
    }

    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            CoreError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `lahendus.json` from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigParseError` if the file cannot be read or
    /// parsed, and `CoreError::ConfigValidationError` if a value is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(CoreError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CoreError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether the database lives in memory only.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY_DATABASE
    }

    /// Validates the configuration values.
    ///
    /// - `port` must be greater than 0
    /// - `database` and `appName` must not be blank
    /// - `host` must be an IP address
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(CoreError::config_validation(
                "port must be greater than 0",
                "Set port to a free TCP port in your lahendus.json, e.g. 8080",
            ));
        }

        if self.database.trim().is_empty() {
            return Err(CoreError::config_validation(
                "database must not be empty",
                "Provide a database file path in your lahendus.json (use ':memory:' for a throwaway database)",
            ));
        }

        if self.app_name.trim().is_empty() {
            return Err(CoreError::config_validation(
                "appName must not be empty",
                "Set appName in your lahendus.json",
            ));
        }

        if self.host.parse::<IpAddr>().is_err() {
            return Err(CoreError::config_validation(
                format!("host '{}' is not an IP address", self.host),
                "Use an address such as 127.0.0.1 or 0.0.0.0 in your lahendus.json",
            ));
        }

        Ok(())
    }
}
