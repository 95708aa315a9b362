pub mod build;
pub mod check;
pub mod classpath;
pub mod order;

use anyhow::{Context, Result};
use std::path::Path;
use strata_build::Builder;
use strata_manifest::ManifestLoader;
use tracing::debug;

/// Load, validate and resolve the project
pub fn load_builder(manifest: Option<&Path>) -> Result<Builder> {
    let mut loader = ManifestLoader::new();
    let loaded = match manifest {
        Some(path) => loader.load_from_file(path),
        None => loader.load_from_directory(&std::env::current_dir()?),
    }
    .context("Failed to load strata.toml")?;
    debug!(
        "Loaded {} {} from {}",
        loaded.manifest.project.name,
        loaded.manifest.project.version,
        loaded.path.display()
    );

    Builder::from_manifest(&loaded)
        .with_context(|| format!("Invalid project in {}", loaded.path.display()))
}
