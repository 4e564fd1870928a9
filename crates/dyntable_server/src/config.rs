//! Server configuration file support.
//!
//! Loads a TOML file whose `[engine]` table feeds the core engine, then lets
//! command-line flags override individual values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dyntable_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on; 0 lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Existing SQLite database file holding the dynamic tables.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Absolute directory for rolling log files; stderr when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Dynamic-table engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    dyntable_core::default_log_level().to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: None,
            log_level: default_log_level(),
            log_dir: None,
            engine: EngineConfig::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to load config `{}`", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise, then applies `overrides`.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(database) = overrides.database {
            self.database = Some(database);
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(dir) = overrides.log_dir {
            self.log_dir = Some(dir);
        }
        self
    }

    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::{Overrides, ServerConfig};
    use dyntable_core::EmptyListing;
    use std::path::PathBuf;

    #[test]
    fn file_values_load_with_engine_section() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 9000
            database = "/srv/ptms.db"

            [engine]
            list_cap = 50
            empty_listing = "placeholder"
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database, Some(PathBuf::from("/srv/ptms.db")));
        assert_eq!(config.engine.list_cap, 50);
        assert_eq!(config.engine.empty_listing, EmptyListing::Placeholder);
        assert_eq!(config.engine.table_prefix, "Act_");
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        let err = ServerConfig::from_toml_str("[engine]\nlist_cap = 0").unwrap_err();
        assert!(err.to_string().contains("list_cap"));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let config = ServerConfig::from_toml_str("port = 9000\nlog_level = \"warn\"")
            .unwrap()
            .with_overrides(Overrides {
                port: Some(7000),
                database: Some(PathBuf::from("/tmp/a.db")),
                ..Overrides::default()
            });

        assert_eq!(config.port, 7000);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.database, Some(PathBuf::from("/tmp/a.db")));
        assert_eq!(config.bind_address(), "127.0.0.1:7000");
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = ServerConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
