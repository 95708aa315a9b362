//! Build system error types
use std::path::PathBuf;
use strata_manifest::ManifestError;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Circular {kind} dependency detected: {path}")]
    Cycle { kind: &'static str, path: String },

    #[error("Unknown {kind} '{reference}' referenced by {referrer}")]
    UnknownReference {
        kind: &'static str,
        reference: String,
        referrer: String,
    },

    #[error("Unknown layer: {layer}")]
    UnknownLayer { layer: String },

    #[error(
        "Invalid cross-project edge {from} -> {to}: variant '{from_variant}' may only depend on itself or its ancestors, not '{to_variant}'"
    )]
    InvalidCrossProjectEdge {
        from: String,
        to: String,
        from_variant: String,
        to_variant: String,
    },

    #[error("Layer graph is frozen: cannot {operation} after resolution")]
    GraphFrozen { operation: String },

    #[error("Ambiguous versions of {module} in bundle '{bundle}': {versions}")]
    AmbiguousVersion {
        bundle: String,
        module: String,
        versions: String,
    },

    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Artifact {coordinate} not found at {path}")]
    ArtifactNotFound { coordinate: String, path: PathBuf },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Archive error at {path}: {error}")]
    Archive {
        path: PathBuf,
        error: zip::result::ZipError,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create an archive error with path context
    pub fn archive(path: impl Into<PathBuf>, error: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            error,
        }
    }

    /// Create a cycle error from the names along the cycle
    pub fn cycle(kind: &'static str, names: &[String]) -> Self {
        Self::Cycle {
            kind,
            path: names.join(" -> "),
        }
    }

    /// Create an unknown reference error
    pub fn unknown_reference(
        kind: &'static str,
        reference: impl Into<String>,
        referrer: impl Into<String>,
    ) -> Self {
        Self::UnknownReference {
            kind,
            reference: reference.into(),
            referrer: referrer.into(),
        }
    }

    /// Errors raised while reading inputs or writing archives
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::IoError { .. } | Self::Archive { .. } | Self::ArtifactNotFound { .. }
        )
    }

    /// Process exit code: 1 for declaration defects, 2 for I/O failures
    pub fn exit_code(&self) -> u8 {
        if self.is_io() {
            2
        } else {
            1
        }
    }
}
