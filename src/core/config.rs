//! OD-018: Persisted connection configuration (`opdeck.yaml`).
//!
//! The core only reads these fields when acquiring resources; it never
//! interprets them further.

use super::error::{Error, Result};
use super::state::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Relational store
    #[serde(default)]
    pub database: SqlConfig,

    /// Document store
    #[serde(default, alias = "mongo")]
    pub documents: DocumentConfig,

    /// Directory the config was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Relational store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_driver")]
    pub driver: String,

    #[serde(default)]
    pub server: String,

    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub pwd: String,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            server: String::new(),
            database: default_database(),
            uid: String::new(),
            pwd: String::new(),
        }
    }
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_database() -> String {
    "opdeck.db".to_string()
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Directory (or `file://` URL) holding JSON-lines collections
    #[serde(default = "default_document_server")]
    pub server: String,

    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            server: default_document_server(),
            collection: default_collection(),
        }
    }
}

fn default_document_server() -> String {
    "documents".to_string()
}

fn default_collection() -> String {
    "records".to_string()
}

impl AppConfig {
    /// SQLite file path, resolved against the config directory.
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.database)
    }

    /// Document store directory, resolved against the config directory.
    pub fn document_dir(&self) -> PathBuf {
        let server = self.documents.server.as_str();
        self.resolve(server.strip_prefix("file://").unwrap_or(server))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Update one dotted key, e.g. `database.server`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let slot = match key {
            "database.driver" => &mut self.database.driver,
            "database.server" => &mut self.database.server,
            "database.database" => &mut self.database.database,
            "database.uid" => &mut self.database.uid,
            "database.pwd" => &mut self.database.pwd,
            "documents.server" | "mongo.server" => &mut self.documents.server,
            "documents.collection" => &mut self.documents.collection,
            other => return Err(Error::Config(format!("unknown config key '{}'", other))),
        };
        *slot = value.to_string();
        Ok(())
    }
}

/// Load config from YAML. A missing file yields defaults rooted at the file's directory.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config not found, using defaults");
        return Ok(AppConfig {
            base_dir,
            ..AppConfig::default()
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| Error::io("read", path, e))?;
    let mut config = parse_config(&content)?;
    config.base_dir = base_dir;
    Ok(config)
}

pub fn parse_config(yaml: &str) -> Result<AppConfig> {
    if yaml.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Config(format!("YAML parse error: {}", e)))
}

/// Save config atomically.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(config)
        .map_err(|e| Error::Config(format!("serialize error: {}", e)))?;
    atomic_write(path, &yaml)
}
