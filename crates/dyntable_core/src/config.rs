//! Engine configuration.
//!
//! # Responsibility
//! - Carry every tunable of the dynamic-table engine with serde defaults.
//! - Load overrides from TOML text or files.
//!
//! # Invariants
//! - A validated config has a non-empty table prefix, a positive list cap,
//!   a route prefix starting with `/` and non-empty key segments.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

/// Result of an empty listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyListing {
    /// An empty table lists as `[]`.
    #[default]
    Empty,
    /// An empty table lists as one record with every column null.
    Placeholder,
}

/// Path segment naming a key column, e.g. `Course` for `CourseId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySegment {
    /// Literal route segment, matched case-insensitively.
    pub segment: String,
    /// Table column filtered by the value that follows the segment.
    pub column: String,
}

impl KeySegment {
    pub fn new(segment: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            column: column.into(),
        }
    }

    pub fn matches(&self, segment: &str) -> bool {
        self.segment.eq_ignore_ascii_case(segment)
    }
}

/// Tunables of the dynamic-table engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Case-insensitive prefix every addressable table name must carry.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Maximum rows returned by any listing.
    #[serde(default = "default_list_cap")]
    pub list_cap: u32,

    /// SQLite schema the catalog lookups are scoped to.
    #[serde(default = "default_catalog_schema")]
    pub catalog_schema: String,

    /// Identity column name used when a table has no INTEGER PRIMARY KEY.
    #[serde(default = "default_identity_column")]
    pub identity_column: String,

    /// Whether get-by-id responses include the identity column.
    #[serde(default)]
    pub by_id_includes_identity: bool,

    /// Listing contract for empty tables.
    #[serde(default)]
    pub empty_listing: EmptyListing,

    /// Path prefix the routes are mounted under.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Single-column filter segment (`/{table}/Course/{id}`).
    #[serde(default = "default_foreign_key")]
    pub foreign_key: KeySegment,

    /// Second segment of the compound-key update route.
    #[serde(default = "default_compound_key")]
    pub compound_key: KeySegment,

    /// SQLite busy timeout per connection.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_table_prefix() -> String {
    "Act_".to_string()
}

fn default_list_cap() -> u32 {
    100
}

fn default_catalog_schema() -> String {
    "main".to_string()
}

fn default_identity_column() -> String {
    "Id".to_string()
}

fn default_route_prefix() -> String {
    "/api/GenericActivity".to_string()
}

fn default_foreign_key() -> KeySegment {
    KeySegment::new("Course", "CourseId")
}

fn default_compound_key() -> KeySegment {
    KeySegment::new("TraineeId", "TraineeId")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            list_cap: default_list_cap(),
            catalog_schema: default_catalog_schema(),
            identity_column: default_identity_column(),
            by_id_includes_identity: false,
            empty_listing: EmptyListing::default(),
            route_prefix: default_route_prefix(),
            foreign_key: default_foreign_key(),
            compound_key: default_compound_key(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Route prefix without a trailing slash.
    pub fn normalized_route_prefix(&self) -> &str {
        self.route_prefix.trim_end_matches('/')
    }

    /// Checks cross-field constraints serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "table_prefix cannot be empty".to_string(),
            ));
        }
        if self.list_cap == 0 {
            return Err(ConfigError::Invalid(
                "list_cap must be greater than zero".to_string(),
            ));
        }
        if self.catalog_schema.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "catalog_schema cannot be empty".to_string(),
            ));
        }
        if !self.route_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "route_prefix must start with `/`, got `{}`",
                self.route_prefix
            )));
        }
        for (label, key) in [
            ("foreign_key", &self.foreign_key),
            ("compound_key", &self.compound_key),
        ] {
            if key.segment.is_empty() || key.segment.contains('/') || key.column.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{label} needs a single path segment and a column name"
                )));
            }
        }
        Ok(())
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for [`EngineConfig`], mostly used by tests and embedders.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.table_prefix = prefix.into();
        self
    }

    pub fn list_cap(mut self, cap: u32) -> Self {
        self.config.list_cap = cap;
        self
    }

    pub fn catalog_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.catalog_schema = schema.into();
        self
    }

    pub fn by_id_includes_identity(mut self, include: bool) -> Self {
        self.config.by_id_includes_identity = include;
        self
    }

    pub fn empty_listing(mut self, mode: EmptyListing) -> Self {
        self.config.empty_listing = mode;
        self
    }

    pub fn route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.route_prefix = prefix.into();
        self
    }

    pub fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.config.busy_timeout_ms = millis;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "cannot read config `{path}`: {message}"),
            Self::Parse(message) => write!(f, "invalid config syntax: {message}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EmptyListing, EngineConfig};

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.table_prefix, "Act_");
        assert_eq!(config.list_cap, 100);
        assert_eq!(config.foreign_key.column, "CourseId");
        assert_eq!(config.empty_listing, EmptyListing::Empty);
    }

    #[test]
    fn partial_toml_overrides_selected_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            list_cap = 25
            empty_listing = "placeholder"
            by_id_includes_identity = true

            [foreign_key]
            segment = "Group"
            column = "GroupId"
            "#,
        )
        .unwrap();

        assert_eq!(config.list_cap, 25);
        assert_eq!(config.empty_listing, EmptyListing::Placeholder);
        assert!(config.by_id_includes_identity);
        assert!(config.foreign_key.matches("group"));
        assert_eq!(config.compound_key.column, "TraineeId");
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = EngineConfig::from_toml_str("list_cap = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("list_cap = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn builder_validates_route_prefix() {
        let err = EngineConfig::builder()
            .route_prefix("api")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("route_prefix"));

        let config = EngineConfig::builder()
            .route_prefix("/tables/")
            .build()
            .unwrap();
        assert_eq!(config.normalized_route_prefix(), "/tables");
    }
}
