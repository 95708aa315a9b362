//! Locating library artifacts on disk
use crate::error::{BuildError, BuildResult};
use std::path::{Path, PathBuf};
use strata_manifest::Coordinate;

/// Maps a coordinate to the artifact file it names
pub trait ArtifactLocator: Send + Sync {
    fn locate(&self, coordinate: &Coordinate) -> BuildResult<PathBuf>;
}

/// Local repository with Maven directory layout
#[derive(Debug, Clone)]
pub struct MavenRepository {
    root: PathBuf,
}

impl MavenRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactLocator for MavenRepository {
    fn locate(&self, coordinate: &Coordinate) -> BuildResult<PathBuf> {
        let path = self.root.join(coordinate.repository_path());
        if path.is_file() {
            Ok(path)
        } else {
            Err(BuildError::ArtifactNotFound {
                coordinate: coordinate.to_string(),
                path,
            })
        }
    }
}
