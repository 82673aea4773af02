//! Configuration management for strandyard.
//!
//! This module handles the `.strandyard/config.yaml` file, which says where a
//! project keeps its task tree, role files, and generated lists. Every field
//! has a default, so an empty or partial file is valid.

use crate::error::Result;
use crate::storage::write_atomic_str;
use crate::tasks::loader::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file path relative to project root.
pub const CONFIG_FILE_PATH: &str = ".strandyard/config.yaml";

fn default_tasks_dir() -> PathBuf {
    PathBuf::from("tasks")
}

fn default_roles_dir() -> PathBuf {
    PathBuf::from("roles")
}

fn default_root_list() -> PathBuf {
    PathBuf::from("tasks/root-tasks.md")
}

fn default_free_list() -> PathBuf {
    PathBuf::from("tasks/free-tasks.md")
}

const fn default_load_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_activity_log() -> PathBuf {
    PathBuf::from(".strandyard/activity.log")
}

/// Project configuration. Relative paths are relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Root of the task tree.
    #[serde(default = "default_tasks_dir")]
    pub tasks_dir: PathBuf,

    /// Directory of `<role>.md` files.
    #[serde(default = "default_roles_dir")]
    pub roles_dir: PathBuf,

    /// Generated list of root tasks.
    #[serde(default = "default_root_list")]
    pub root_list: PathBuf,

    /// Generated list of free tasks.
    #[serde(default = "default_free_list")]
    pub free_list: PathBuf,

    /// Number of task files parsed at once when loading the tree.
    #[serde(default = "default_load_concurrency")]
    pub load_concurrency: usize,

    /// JSONL activity log read for completion counts.
    #[serde(default = "default_activity_log")]
    pub activity_log: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tasks_dir: default_tasks_dir(),
            roles_dir: default_roles_dir(),
            root_list: default_root_list(),
            free_list: default_free_list(),
            load_concurrency: default_load_concurrency(),
            activity_log: default_activity_log(),
        }
    }
}

/// A [`StoreConfig`] with every path joined onto a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Root of the task tree.
    pub tasks_dir: PathBuf,
    /// Directory of role files.
    pub roles_dir: PathBuf,
    /// Root task list file.
    pub root_list: PathBuf,
    /// Free task list file.
    pub free_list: PathBuf,
    /// Activity log file.
    pub activity_log: PathBuf,
}

impl StoreConfig {
    /// Load config from a specific base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(base_dir: &Path) -> Result<Option<Self>> {
        let config_path = Self::config_path(base_dir);
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)?;
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Load config from `base_dir`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(base_dir: &Path) -> Result<Self> {
        Ok(Self::load_from(base_dir)?.unwrap_or_default())
    }

    /// Save config to a specific base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, base_dir: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        write_atomic_str(Self::config_path(base_dir), &content)
    }

    /// Get the config file path for a base directory.
    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE_PATH)
    }

    /// Join every configured path onto `base_dir`. Absolute paths are kept.
    #[must_use]
    pub fn resolve(&self, base_dir: &Path) -> ResolvedPaths {
        ResolvedPaths {
            tasks_dir: base_dir.join(&self.tasks_dir),
            roles_dir: base_dir.join(&self.roles_dir),
            root_list: base_dir.join(&self.root_list),
            free_list: base_dir.join(&self.free_list),
            activity_log: base_dir.join(&self.activity_log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.tasks_dir, PathBuf::from("tasks"));
        assert_eq!(config.free_list, PathBuf::from("tasks/free-tasks.md"));
        assert_eq!(config.load_concurrency, 10);
    }

    #[test]
    fn test_store_config_load_not_found() {
        let dir = TempDir::new().unwrap();
        let result = StoreConfig::load_from(dir.path()).unwrap();
        assert!(result.is_none());
        assert_eq!(StoreConfig::load_or_default(dir.path()).unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_store_config_save_and_load() {
        let dir = TempDir::new().unwrap();
        let config =
            StoreConfig { tasks_dir: PathBuf::from("work"), load_concurrency: 4, ..StoreConfig::default() };

        config.save_to(dir.path()).unwrap();

        let loaded = StoreConfig::load_from(dir.path()).unwrap().unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_store_config_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = StoreConfig::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "roles_dir: team/roles\n").unwrap();

        let loaded = StoreConfig::load_from(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.roles_dir, PathBuf::from("team/roles"));
        assert_eq!(loaded.tasks_dir, PathBuf::from("tasks"));
    }

    #[test]
    fn test_store_config_empty_file_is_default() {
        let dir = TempDir::new().unwrap();
        let path = StoreConfig::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();

        assert_eq!(StoreConfig::load_from(dir.path()).unwrap(), Some(StoreConfig::default()));
    }

    #[test]
    fn test_store_config_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = StoreConfig::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "load_concurrency: [not, a, number]\n").unwrap();

        assert!(StoreConfig::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_joins_onto_base() {
        let resolved = StoreConfig::default().resolve(Path::new("/project"));
        assert_eq!(resolved.tasks_dir, PathBuf::from("/project/tasks"));
        assert_eq!(resolved.roles_dir, PathBuf::from("/project/roles"));
        assert_eq!(resolved.activity_log, PathBuf::from("/project/.strandyard/activity.log"));
    }
}
