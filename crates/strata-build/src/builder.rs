//! Build orchestration and pipeline management
use crate::archive::{ArchiveWriter, WrittenArchive};
use crate::assembler::Assembler;
use crate::bundle::{BundleId, BundleSet};
use crate::declare::{lower, Project};
use crate::error::{BuildError, BuildResult};
use crate::graph::{LayerHandle, QualifiedName};
use crate::locator::{ArtifactLocator, MavenRepository};
use crate::resolver::ClasspathResolver;
use crate::settings::BuildSettings;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use strata_manifest::LoadedManifest;
use tracing::{debug, info};

/// Build context - result of a successful build
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    /// Build statistics
    pub stats: BuildStats,
    /// Archives written, in build order
    pub bundles: Vec<BuiltBundle>,
}

/// Build statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Layers in the graph
    pub layers: usize,
    /// Bundles written
    pub bundles: usize,
    /// Number of bundle groups written one after another
    pub bundle_groups: usize,
    /// Time spent planning and writing archives
    pub total_time: Duration,
}

/// One written bundle
#[derive(Debug, Clone, Serialize)]
pub struct BuiltBundle {
    pub name: String,
    pub kind: String,
    pub archive: WrittenArchive,
    /// Library artifacts shaded into the archive
    pub shaded: usize,
}

/// Summary of a successful `check`
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub variants: usize,
    pub layers: usize,
    pub bundles: usize,
}

/// Main builder for orchestrating builds
pub struct Builder {
    settings: BuildSettings,
    resolver: ClasspathResolver,
    bundles: BundleSet,
    locator: Box<dyn ArtifactLocator>,
}

impl Builder {
    /// Lower and resolve a loaded manifest
    pub fn from_manifest(loaded: &LoadedManifest) -> BuildResult<Self> {
        let settings = BuildSettings::from_loaded(loaded);
        let project = lower(&loaded.manifest, &settings)?;
        Ok(Self::new(settings, project))
    }

    /// Resolve a lowered project; the graph is frozen from here on
    pub fn new(settings: BuildSettings, project: Project) -> Self {
        let locator = Box::new(MavenRepository::new(&settings.repository));
        let resolver = ClasspathResolver::with_parallelism(project.graph, settings.parallel);
        Self {
            settings,
            resolver,
            bundles: project.bundles,
            locator,
        }
    }

    /// Read library artifacts from somewhere other than the configured repository
    pub fn with_locator(mut self, locator: Box<dyn ArtifactLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &ClasspathResolver {
        &self.resolver
    }

    pub fn bundles(&self) -> &BundleSet {
        &self.bundles
    }

    /// Layer groups in compile order
    pub fn layer_groups(&self) -> BuildResult<Vec<Vec<LayerHandle>>> {
        self.resolver.graph().parallel_build_groups()
    }

    /// Bundles named on the command line; an empty list selects all.
    ///
    /// `variant:name` selects one bundle, a bare name every bundle with it.
    pub fn select(&self, names: &[String]) -> BuildResult<Vec<BundleId>> {
        if names.is_empty() {
            return Ok(self.bundles.iter().map(|(id, _)| id).collect());
        }

        let mut selected = Vec::new();
        for name in names {
            let matches: Vec<BundleId> = if name.contains(':') {
                let key = QualifiedName::from_reference("", name);
                self.bundles.find(&key).into_iter().collect()
            } else {
                self.bundles
                    .iter()
                    .filter(|(_, b)| b.name.name == *name)
                    .map(|(id, _)| id)
                    .collect()
            };

            if matches.is_empty() {
                return Err(BuildError::unknown_reference("bundle", name, "command line"));
            }
            selected.extend(matches);
        }
        Ok(selected)
    }

    /// Validate every bundle's library selection without touching the disk
    pub fn check(&self) -> BuildResult<CheckReport> {
        let assembler = self.assembler();
        for (id, bundle) in self.bundles.iter() {
            let shaded = assembler.shaded_libraries(id)?;
            debug!("Bundle {} shades {} artifacts", bundle.name, shaded.len());
        }
        self.bundles.build_groups()?;

        let graph = self.resolver.graph();
        Ok(CheckReport {
            variants: graph.variants().len(),
            layers: graph.layer_count(),
            bundles: self.bundles.len(),
        })
    }

    /// Write the selected bundles and everything they are built from
    pub fn build(&self, names: &[String]) -> BuildResult<BuildContext> {
        let start = Instant::now();
        let selected: HashSet<BundleId> = self
            .bundles
            .with_dependencies(&self.select(names)?)
            .into_iter()
            .collect();

        let assembler = self.assembler();
        let writer = ArchiveWriter::new(self.settings.retry_io);
        let mut built = Vec::new();
        let mut groups = 0;

        for group in self.bundles.build_groups()? {
            let group: Vec<BundleId> = group.into_iter().filter(|id| selected.contains(id)).collect();
            if group.is_empty() {
                continue;
            }
            groups += 1;

            let results: Vec<BuildResult<BuiltBundle>> = if self.settings.parallel {
                group
                    .par_iter()
                    .map(|&id| self.build_bundle(&assembler, &writer, id))
                    .collect()
            } else {
                group
                    .iter()
                    .map(|&id| self.build_bundle(&assembler, &writer, id))
                    .collect()
            };
            for result in results {
                built.push(result?);
            }
        }

        let stats = BuildStats {
            layers: self.resolver.graph().layer_count(),
            bundles: built.len(),
            bundle_groups: groups,
            total_time: start.elapsed(),
        };
        info!(
            "Built {} bundles in {:?}",
            stats.bundles, stats.total_time
        );

        Ok(BuildContext {
            stats,
            bundles: built,
        })
    }

    fn assembler(&self) -> Assembler<'_> {
        Assembler::new(&self.resolver, &self.bundles, &self.settings, self.locator.as_ref())
    }

    fn build_bundle(
        &self,
        assembler: &Assembler<'_>,
        writer: &ArchiveWriter,
        id: BundleId,
    ) -> BuildResult<BuiltBundle> {
        let bundle = self.bundles.get(id);
        let layout = assembler.assemble_bundle(id)?;
        let destination = self.settings.output_dir.join(&layout.file_name);
        let archive = writer.write(&layout, &destination)?;

        Ok(BuiltBundle {
            name: bundle.name.to_string(),
            kind: bundle.kind().to_string(),
            archive,
            shaded: layout.shaded.len(),
        })
    }
}
