use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors raised while locating, reading, or parsing the configuration.
///
/// Configuration failures are fatal at startup; there is no recovery path.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// Backend selection and connection parameters.
///
/// `host`, `user`, and `password` are recognized for forward compatibility
/// with remote backends; the default local-file variant ignores them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend variant; only `sqlite` is currently supported
    #[serde(default = "default_backend_type")]
    pub backend_type: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Database file name; relative paths resolve under the data directory
    #[serde(default = "default_database")]
    pub database: String,
}

/// The record table this instance browses. Schema is configuration, not
/// architecture: the column list drives both table creation and the view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginsConfig {
    /// Plugin directory; defaults to `plugins/` under the data directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_backend_type() -> String {
    "sqlite".to_string()
}

fn default_database() -> String {
    "records.db".to_string()
}

fn default_table() -> String {
    "parts".to_string()
}

fn default_columns() -> Vec<ColumnSpec> {
    [
        ("type", ColumnKind::Text),
        ("model", ColumnKind::Text),
        ("qty", ColumnKind::Integer),
        ("brand", ColumnKind::Text),
        ("location", ColumnKind::Text),
    ]
    .into_iter()
    .map(|(name, kind)| ColumnSpec {
        name: name.to_string(),
        kind,
    })
    .collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            host: String::new(),
            user: String::new(),
            password: String::new(),
            database: default_database(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            columns: default_columns(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, materializing a default
    /// config file on first run so users have something to edit.
    pub fn load_or_init_default() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            info!("Created default configuration at {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_yaml::to_string(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::data_dir()?.join("config.yaml"))
    }

    /// Per-user data directory holding the config, database, and plugins
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".tabula"))
    }

    /// Resolve the database target. Absolute paths and `:memory:` pass
    /// through unchanged; relative names land in the data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let raw = Path::new(&self.database.database);
        if self.database.database == ":memory:" || raw.is_absolute() {
            return Ok(raw.to_path_buf());
        }
        Ok(Self::data_dir()?.join(raw))
    }

    /// Resolve the plugin directory
    pub fn plugins_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.plugins.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("plugins")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.backend_type, "sqlite");
        assert_eq!(config.database.database, "records.db");
        assert_eq!(config.store.table, "parts");
        assert_eq!(config.store.columns.len(), 5);
        assert_eq!(config.store.columns[2].kind, ColumnKind::Integer);
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
database:
  backend_type: sqlite
  database: /tmp/inventory.db
store:
  table: widgets
  columns:
    - name: label
      kind: text
    - name: count
      kind: integer
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.database, "/tmp/inventory.db");
        assert_eq!(config.store.table, "widgets");
        assert_eq!(config.store.columns.len(), 2);
        assert_eq!(config.store.columns[1].name, "count");
    }

    #[test]
    fn test_absolute_database_path_passes_through() {
        let mut config = Config::default();
        config.database.database = "/tmp/records.db".to_string();
        let path = config.database_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/records.db"));
    }

    #[test]
    fn test_memory_database_passes_through() {
        let mut config = Config::default();
        config.database.database = ":memory:".to_string();
        let path = config.database_path().unwrap();
        assert_eq!(path, PathBuf::from(":memory:"));
    }

    #[test]
    fn test_first_run_creates_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = Config::default();
        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.store.table, config.store.table);
    }
}
