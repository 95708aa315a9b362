//! Immutable per-invocation build settings
use crate::graph::LayerNode;
use indexmap::IndexMap;
use std::env;
use std::path::PathBuf;
use strata_manifest::LoadedManifest;

/// Build settings
///
/// Built once per invocation and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Project name, the default archive base name prefix
    pub project_name: String,
    /// Project version, part of every archive name
    pub version: String,
    /// Where bundle archives are written
    pub output_dir: PathBuf,
    /// Root of compiled layer outputs
    pub classes_dir: PathBuf,
    /// Local Maven-layout repository
    pub repository: PathBuf,
    /// Project root; relative layer output overrides resolve against it
    pub project_root: PathBuf,
    /// Manifest attributes every bundle starts from
    pub base_manifest: IndexMap<String, String>,
    /// Fail on shaded/provided version mismatches instead of warning
    pub strict_provided_versions: bool,
    /// Resolve layers and write bundles on worker threads
    pub parallel: bool,
    /// Retry a failed archive write once
    pub retry_io: bool,
}

impl BuildSettings {
    /// Settings with conventional directories under `project_root`
    pub fn new(
        project_name: impl Into<String>,
        version: impl Into<String>,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        let project_root = project_root.into();
        Self {
            project_name: project_name.into(),
            version: version.into(),
            output_dir: project_root.join("build/libs"),
            classes_dir: project_root.join("build/classes"),
            repository: project_root.join("repository"),
            project_root,
            base_manifest: IndexMap::new(),
            strict_provided_versions: false,
            parallel: true,
            retry_io: true,
        }
    }

    /// Settings for a loaded manifest, capturing GIT_COMMIT and GIT_BRANCH
    pub fn from_loaded(loaded: &LoadedManifest) -> Self {
        let project = &loaded.manifest.project;
        let mut base_manifest = loaded.manifest.manifest.clone();
        for (attribute, variable) in [("Git-Commit", "GIT_COMMIT"), ("Git-Branch", "GIT_BRANCH")] {
            if let Ok(value) = env::var(variable) {
                if !value.is_empty() {
                    base_manifest.insert(attribute.to_string(), value);
                }
            }
        }

        Self {
            project_name: project.name.clone(),
            version: project.version.clone(),
            output_dir: loaded.output_dir(),
            classes_dir: loaded.classes_dir(),
            repository: loaded.repository(),
            project_root: loaded.root.clone(),
            base_manifest,
            strict_provided_versions: loaded.strict_provided_versions(),
            parallel: loaded.parallel(),
            retry_io: loaded.retry_io(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_classes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.classes_dir = dir.into();
        self
    }

    pub fn with_repository(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repository = dir.into();
        self
    }

    pub fn with_base_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_manifest.insert(name.into(), value.into());
        self
    }

    pub fn with_strict_provided_versions(mut self, strict: bool) -> Self {
        self.strict_provided_versions = strict;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_retry_io(mut self, retry: bool) -> Self {
        self.retry_io = retry;
        self
    }

    /// Compiled output directory of a layer
    pub fn layer_output_dir(&self, layer: &LayerNode) -> PathBuf {
        match &layer.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.project_root.join(dir),
            None => self
                .classes_dir
                .join(&layer.key.variant)
                .join(&layer.key.name),
        }
    }

    /// `<base>-<version>[-<classifier>].jar`
    pub fn archive_file_name(&self, base: &str, classifier: Option<&str>) -> String {
        match classifier {
            Some(classifier) if !classifier.is_empty() => {
                format!("{}-{}-{}.jar", base, self.version, classifier)
            }
            _ => format!("{}-{}.jar", base, self.version),
        }
    }
}
