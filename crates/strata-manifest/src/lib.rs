//! Strata project manifests (strata.toml)
//!
//! Declarative description of a layered build:
//! - Project variants (`common`, `forge`, `vanilla`, ...) and their parents
//! - Layers per variant with compile and runtime edges
//! - Library sets with coordinates, inheritance, exclusions and derivations
//! - Bundles (plain, shaded, installer and universal archives)
//!
//! # Configuration Hierarchy
//!
//! Settings are merged in the following order (later overrides earlier):
//! 1. Global config (~/.strata/config.toml)
//! 2. Project manifest (./strata.toml)
//! 3. Environment variables (STRATA_*)
//! 4. CLI flags (handled by the caller)

pub mod coordinate;
pub mod global;
pub mod loader;
pub mod manifest;
pub mod validator;

use std::path::PathBuf;

pub use coordinate::{ArtifactId, Coordinate, ExclusionRule, ModuleId};
pub use global::GlobalConfig;
pub use loader::{LoadedManifest, ManifestLoader, MANIFEST_FILE_NAME};
pub use manifest::{
    ArtifactDecl, BundleDecl, DependencyIndexDecl, DeriveDecl, LayerDecl, LayerSource,
    LibrarySetDecl, NestDecl, ProjectManifest, ProjectMetadata, RenameDecl, ResolutionConfig,
    VariantDecl,
};
pub use validator::{ValidationError, Validator};

/// Manifest loading errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML syntax in {file}: {error}")]
    Parse {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid coordinate '{0}': expected group:module:version[:classifier][@extension]")]
    InvalidCoordinate(String),

    #[error("Invalid exclusion '{0}': expected group or group:module")]
    InvalidExclusion(String),

    #[error("Invalid manifest:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, ManifestError>;

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
