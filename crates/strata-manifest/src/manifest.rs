//! Project manifest parsing and types (strata.toml)

use crate::coordinate::{Coordinate, ExclusionRule};
use crate::ManifestError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project manifest (strata.toml)
///
/// Every table is an ordered map: declaration order is the tie-breaker for
/// build order and classpath order, so it must survive parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectManifest {
    pub project: ProjectMetadata,
    /// Manifest attributes shared by every bundle
    #[serde(default)]
    pub manifest: IndexMap<String, String>,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub variants: IndexMap<String, VariantDecl>,
}

impl ProjectManifest {
    /// Parse manifest from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
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
        Self::from_str(&content).map_err(|error| ManifestError::Parse {
            file: path.to_path_buf(),
            error,
        })
    }

    /// Serialize to TOML string
    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Look up a variant declaration
    pub fn variant(&self, name: &str) -> Option<&VariantDecl> {
        self.variants.get(name)
    }
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Where bundle archives are written (default: build/libs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Root of compiled layer outputs (default: build/classes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes_dir: Option<PathBuf>,
    /// Local Maven-layout repository holding library artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,
    /// Fail instead of warn when a shaded module's version differs from the provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_provided_versions: Option<bool>,
}

/// Global resolution strategy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Modules pinned to a version everywhere
    #[serde(default)]
    pub force: Vec<Coordinate>,
    /// Modules removed from every library set
    #[serde(default)]
    pub exclude: Vec<ExclusionRule>,
}

/// A project variant (common, forge, vanilla, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariantDecl {
    /// Variant whose layers and library sets this one may reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Archive base name (default: `<project>-<variant>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
    /// Manifest attributes shared by this variant's bundles
    #[serde(default)]
    pub manifest: IndexMap<String, String>,
    #[serde(default)]
    pub layers: IndexMap<String, LayerDecl>,
    #[serde(default)]
    pub libraries: IndexMap<String, LibrarySetDecl>,
    #[serde(default)]
    pub bundles: IndexMap<String, BundleDecl>,
}

/// Layer declaration. References are `name` (same variant) or `variant:name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LayerDecl {
    /// Layers whose output is visible at compile time
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Layers whose output is visible at runtime only
    #[serde(default)]
    pub runtime_outputs: Vec<String>,
    /// Library sets visible at compile time
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Library sets visible at runtime only
    #[serde(default)]
    pub runtime_libraries: Vec<String>,
    /// Compiled output directory override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Library set declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LibrarySetDecl {
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactDecl>,
    /// Applied to the flattened membership, inherited members included
    #[serde(default)]
    pub exclude: Vec<ExclusionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<DeriveDecl>,
}

/// Artifact entry in a library set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArtifactDecl {
    /// Plain coordinate string
    Simple(Coordinate),
    /// Coordinate with exclusions
    Detailed {
        coordinate: Coordinate,
        #[serde(default)]
        exclude: Vec<ExclusionRule>,
    },
}

impl ArtifactDecl {
    pub fn coordinate(&self) -> &Coordinate {
        match self {
            ArtifactDecl::Simple(c) => c,
            ArtifactDecl::Detailed { coordinate, .. } => coordinate,
        }
    }

    pub fn exclusions(&self) -> &[ExclusionRule] {
        match self {
            ArtifactDecl::Simple(_) => &[],
            ArtifactDecl::Detailed { exclude, .. } => exclude,
        }
    }
}

/// Membership computed as `from` minus every module in `provided`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeriveDecl {
    pub from: String,
    #[serde(default)]
    pub provided: Vec<String>,
}

/// Bundle (archive) declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BundleDecl {
    /// Archive classifier: `<archive_name>-<version>-<classifier>.jar`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Explicit archive file name, overrides the classifier scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default)]
    pub layers: Vec<LayerSource>,
    /// Library sets whose artifacts are shaded in
    #[serde(default)]
    pub shade: Vec<String>,
    /// Library sets already provided at runtime
    #[serde(default)]
    pub exclude_libraries: Vec<String>,
    /// Extra destination path globs to drop
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Concatenate META-INF/services files (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_service_files: Option<bool>,
    #[serde(default)]
    pub manifest: IndexMap<String, String>,
    /// Per-section manifest attributes, keyed by section name
    #[serde(default)]
    pub manifest_sections: IndexMap<String, IndexMap<String, String>>,
    /// Inherit another bundle's manifest attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_from: Option<String>,
    #[serde(default)]
    pub rename: Vec<RenameDecl>,
    /// Bundles whose archive contents are copied in
    #[serde(default)]
    pub inline: Vec<String>,
    /// Bundles whose archive files are embedded under a directory
    #[serde(default)]
    pub nest: Vec<NestDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_index: Option<DependencyIndexDecl>,
}

/// Layer included in a bundle, optionally under a prefix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LayerSource {
    Name(String),
    Relocated { layer: String, into: String },
}

impl LayerSource {
    pub fn layer(&self) -> &str {
        match self {
            LayerSource::Name(name) => name,
            LayerSource::Relocated { layer, .. } => layer,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        match self {
            LayerSource::Name(_) => None,
            LayerSource::Relocated { into, .. } => Some(into),
        }
    }
}

/// Destination path substitution (regex)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RenameDecl {
    pub pattern: String,
    pub replacement: String,
}

/// Another bundle embedded as a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NestDecl {
    pub bundle: String,
    #[serde(default)]
    pub into: String,
}

/// Generated JSON listing of library coordinates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DependencyIndexDecl {
    /// Destination path inside the bundle
    pub path: String,
    /// Section name to library sets
    pub sections: IndexMap<String, Vec<String>>,
    /// Library sets whose modules are left out of every section
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_manifest() {
        let toml = r#"
            [project]
            name = "sponge"
            version = "1.0.0"
        "#;

        let manifest = ProjectManifest::from_str(toml).unwrap();
        assert_eq!(manifest.project.name, "sponge");
        assert!(manifest.variants.is_empty());
    }

    #[test]
    fn test_variant_tables_keep_declaration_order() {
        let toml = r#"
            [project]
            name = "sponge"
            version = "1.0.0"

            [variants.common.layers.main]
            [variants.common.layers.applaunch]
            [variants.common.layers.launch]
        "#;

        let manifest = ProjectManifest::from_str(toml).unwrap();
        let layers: Vec<&str> = manifest.variants["common"]
            .layers
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(layers, vec!["main", "applaunch", "launch"]);
    }

    #[test]
    fn test_artifact_forms() {
        let toml = r#"
            [project]
            name = "sponge"
            version = "1.0.0"

            [variants.common.libraries.applaunch]
            artifacts = [
                "com.google.guava:guava:21.0",
                { coordinate = "org.spongepowered:configurate-hocon:4.1.2", exclude = ["org.checkerframework:checker-qual"] },
            ]
        "#;

        let manifest = ProjectManifest::from_str(toml).unwrap();
        let set = &manifest.variants["common"].libraries["applaunch"];
        assert_eq!(set.artifacts.len(), 2);
        assert!(set.artifacts[0].exclusions().is_empty());
        assert_eq!(set.artifacts[1].coordinate().module, "configurate-hocon");
        assert_eq!(set.artifacts[1].exclusions().len(), 1);
    }

    #[test]
    fn test_bad_coordinate_is_a_parse_error() {
        let toml = r#"
            [project]
            name = "sponge"
            version = "1.0.0"

            [variants.common.libraries.broken]
            artifacts = ["not-a-coordinate"]
        "#;

        assert!(ProjectManifest::from_str(toml).is_err());
    }

    #[test]
    fn test_layer_sources() {
        let toml = r#"
            [project]
            name = "sponge"
            version = "1.0.0"

            [variants.common.bundles.jar]
            layers = ["main", { layer = "launch", into = "launch/" }]
        "#;

        let manifest = ProjectManifest::from_str(toml).unwrap();
        let bundle = &manifest.variants["common"].bundles["jar"];
        assert_eq!(bundle.layers[0].layer(), "main");
        assert_eq!(bundle.layers[0].prefix(), None);
        assert_eq!(bundle.layers[1].layer(), "launch");
        assert_eq!(bundle.layers[1].prefix(), Some("launch/"));
    }
}
