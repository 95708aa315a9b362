//! Manifest Loader
//!
//! Finds `strata.toml`, validates it and merges it with global configuration
//! and environment overrides.

use crate::global::GlobalConfig;
use crate::manifest::ProjectManifest;
use crate::validator::Validator;
use crate::{ManifestError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for when walking up from the working directory
pub const MANIFEST_FILE_NAME: &str = "strata.toml";

const DEFAULT_OUTPUT_DIR: &str = "build/libs";
const DEFAULT_CLASSES_DIR: &str = "build/classes";
const DEFAULT_REPOSITORY_DIR: &str = "repository";

/// Manifest loader
///
/// Precedence, lowest first:
/// 1. Global config (~/.strata/config.toml)
/// 2. Project manifest (strata.toml)
/// 3. Environment variables (STRATA_*)
pub struct ManifestLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// A validated manifest together with where it was found
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: ProjectManifest,
    pub global: GlobalConfig,
    /// Directory containing strata.toml; relative paths resolve against it
    pub root: PathBuf,
    pub path: PathBuf,
}

impl ManifestLoader {
    /// Create a new manifest loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use a specific global config file instead of ~/.strata/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load the manifest found at or above `start_dir`
    pub fn load_from_directory(&mut self, start_dir: &Path) -> Result<LoadedManifest> {
        let path = Self::find_manifest(start_dir)
            .ok_or_else(|| ManifestError::NotFound(start_dir.join(MANIFEST_FILE_NAME)))?;
        self.load_from_file(&path)
    }

    /// Load a specific manifest file
    pub fn load_from_file(&mut self, path: &Path) -> Result<LoadedManifest> {
        let manifest = ProjectManifest::from_file(path)?;
        Validator::validate(&manifest).map_err(ManifestError::Validation)?;

        let manifest = Self::apply_env_overrides(manifest);
        let global = self.load_global_config()?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(LoadedManifest {
            manifest,
            global,
            root,
            path: path.to_path_buf(),
        })
    }

    /// Walk up the directory tree looking for strata.toml
    pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(MANIFEST_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load global configuration; a missing file means defaults
    fn load_global_config(&mut self) -> Result<GlobalConfig> {
        if self.global_config_path.is_none() {
            match GlobalConfig::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ManifestError::HomeNotFound) => return Ok(GlobalConfig::default()),
                Err(e) => return Err(e),
            }
        }

        match self.global_config_path.as_deref() {
            Some(path) if path.exists() => GlobalConfig::load_from_file(path),
            _ => Ok(GlobalConfig::default()),
        }
    }

    /// Apply STRATA_* environment overrides to the project section
    fn apply_env_overrides(mut manifest: ProjectManifest) -> ProjectManifest {
        if let Ok(repository) = env::var("STRATA_REPOSITORY") {
            manifest.project.repository = Some(PathBuf::from(repository));
        }
        if let Ok(output_dir) = env::var("STRATA_OUTPUT_DIR") {
            manifest.project.output_dir = Some(PathBuf::from(output_dir));
        }
        if let Ok(classes_dir) = env::var("STRATA_CLASSES_DIR") {
            manifest.project.classes_dir = Some(PathBuf::from(classes_dir));
        }
        if let Ok(strict) = env::var("STRATA_STRICT_VERSIONS") {
            manifest.project.strict_provided_versions = Some(matches!(
                strict.to_lowercase().as_str(),
                "true" | "1" | "yes"
            ));
        }
        manifest
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedManifest {
    /// Effective archive output directory
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(
            self.manifest
                .project
                .output_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_OUTPUT_DIR)),
        )
    }

    /// Effective root of compiled layer outputs
    pub fn classes_dir(&self) -> PathBuf {
        self.resolve(
            self.manifest
                .project
                .classes_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_CLASSES_DIR)),
        )
    }

    /// Effective repository (project > global > `<root>/repository`)
    pub fn repository(&self) -> PathBuf {
        let configured = self
            .manifest
            .project
            .repository
            .as_deref()
            .or(self.global.repository.as_deref())
            .unwrap_or(Path::new(DEFAULT_REPOSITORY_DIR));
        self.resolve(configured)
    }

    pub fn strict_provided_versions(&self) -> bool {
        self.manifest.project.strict_provided_versions.unwrap_or(false)
    }

    pub fn parallel(&self) -> bool {
        self.global.parallel.unwrap_or(true)
    }

    pub fn retry_io(&self) -> bool {
        self.global.retry_io.unwrap_or(true)
    }

    /// Resolve a possibly relative path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[project]
name = "sponge"
version = "1.0.0"
"#;

    fn loader(temp_dir: &TempDir) -> ManifestLoader {
        ManifestLoader::new().with_global_config_path(temp_dir.path().join("no-global.toml"))
    }

    #[test]
    fn test_find_manifest_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(MANIFEST_FILE_NAME), MINIMAL).unwrap();
        let sub_dir = temp_dir.path().join("forge/src");
        fs::create_dir_all(&sub_dir).unwrap();

        let loaded = loader(&temp_dir).load_from_directory(&sub_dir).unwrap();
        assert_eq!(loaded.manifest.project.name, "sponge");
        assert_eq!(loaded.root, temp_dir.path());
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let result = loader(&temp_dir).load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ManifestError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_default_paths_resolve_against_root() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE_NAME);
        fs::write(&path, MINIMAL).unwrap();

        let loaded = loader(&temp_dir).load_from_file(&path).unwrap();
        assert_eq!(loaded.output_dir(), temp_dir.path().join("build/libs"));
        assert_eq!(loaded.classes_dir(), temp_dir.path().join("build/classes"));
        assert_eq!(loaded.repository(), temp_dir.path().join("repository"));
        assert!(!loaded.strict_provided_versions());
    }

    #[test]
    #[serial]
    fn test_global_repository_used_when_project_has_none() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE_NAME);
        fs::write(&path, MINIMAL).unwrap();
        let global = temp_dir.path().join("global.toml");
        fs::write(&global, "repository = \"/opt/maven\"\n").unwrap();

        let loaded = ManifestLoader::new()
            .with_global_config_path(&global)
            .load_from_file(&path)
            .unwrap();
        assert_eq!(loaded.repository(), PathBuf::from("/opt/maven"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE_NAME);
        fs::write(&path, MINIMAL).unwrap();

        env::set_var("STRATA_OUTPUT_DIR", "dist");
        env::set_var("STRATA_STRICT_VERSIONS", "yes");

        let loaded = loader(&temp_dir).load_from_file(&path).unwrap();

        env::remove_var("STRATA_OUTPUT_DIR");
        env::remove_var("STRATA_STRICT_VERSIONS");

        assert_eq!(loaded.output_dir(), temp_dir.path().join("dist"));
        assert!(loaded.strict_provided_versions());
    }

    #[test]
    fn test_invalid_manifest_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE_NAME);
        fs::write(
            &path,
            r#"
[project]
name = ""
version = "1.0.0"
"#,
        )
        .unwrap();

        let result = loader(&temp_dir).load_from_file(&path);
        assert!(matches!(result, Err(ManifestError::Validation(_))));
    }
}
