//! Global Configuration (~/.strata/config.toml)
//!
//! User-level defaults that apply to every project on the machine.

use crate::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.strata/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default local repository (e.g. ~/.m2/repository)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,

    /// Resolve layers and write bundles on worker threads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Retry a failed archive write once before giving up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_io: Option<bool>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ManifestError::NotFound(path.to_path_buf())
            } else {
                ManifestError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        toml::from_str(&content).map_err(|e| ManifestError::Parse {
            file: path.to_path_buf(),
            error: e,
        })
    }

    /// Get the global configuration directory (~/.strata)
    pub fn global_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ManifestError::HomeNotFound)?;
        Ok(home.join(".strata"))
    }

    /// Get the global configuration file path (~/.strata/config.toml)
    pub fn global_config_path() -> Result<PathBuf> {
        Ok(Self::global_config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_global_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "repository = \"/opt/maven\"\nretry_io = false\n").unwrap();

        let config = GlobalConfig::load_from_file(&path).unwrap();
        assert_eq!(config.repository, Some(PathBuf::from("/opt/maven")));
        assert_eq!(config.retry_io, Some(false));
        assert_eq!(config.parallel, None);
    }

    #[test]
    fn test_missing_global_config() {
        let temp_dir = TempDir::new().unwrap();
        let result = GlobalConfig::load_from_file(&temp_dir.path().join("config.toml"));
        assert!(matches!(result, Err(ManifestError::NotFound(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "colour = \"blue\"\n").unwrap();

        assert!(matches!(
            GlobalConfig::load_from_file(&path),
            Err(ManifestError::Parse { .. })
        ));
    }
}
