//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE_NAME: &str = "memtask-migrate.yaml";

/// Migration configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub statuses: StatusesConfig,
}

/// Location of the database being migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/memory.db")
}

/// Backup handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory for backup files. Defaults to the database's own directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Keep the backup after a successful run.
    #[serde(default = "default_keep")]
    pub keep: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: None,
            keep: default_keep(),
        }
    }
}

fn default_keep() -> bool {
    true
}

/// Status resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusesConfig {
    /// Status assigned to tasks whose legacy status cannot be resolved.
    #[serde(default = "default_status")]
    pub default: String,
}

impl Default for StatusesConfig {
    fn default() -> Self {
        Self {
            default: default_status(),
        }
    }
}

fn default_status() -> String {
    "not_started".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Resolve configuration.
    ///
    /// An explicit path must load. Otherwise the working directory and then the
    /// user config directory are tried, falling back to defaults. Environment
    /// variables are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::discover().unwrap_or_default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn discover() -> Option<Self> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("memtask-migrate").join("config.yaml"));
        }

        for candidate in candidates {
            if !candidate.exists() {
                continue;
            }
            match Self::load(&candidate) {
                Ok(config) => {
                    tracing::debug!(path = %candidate.display(), "Loaded configuration");
                    return Some(config);
                }
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), "Ignoring config file: {:#}", e);
                }
            }
        }
        None
    }

    /// Apply `MEMTASK_DB_PATH` and `MEMTASK_BACKUP_DIR` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("MEMTASK_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }

        if let Ok(dir) = std::env::var("MEMTASK_BACKUP_DIR") {
            self.backup.directory = Some(PathBuf::from(dir));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("data/memory.db"));
        assert!(config.backup.keep);
        assert!(config.backup.directory.is_none());
        assert_eq!(config.statuses.default, "not_started");
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  path: /srv/notes.db\nbackup:\n  keep: false\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/srv/notes.db"));
        assert!(!config.backup.keep);
        assert_eq!(config.statuses.default, "not_started");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Config::resolve(Some(&temp.path().join("missing.yaml")));
        assert!(result.is_err());
    }
}
