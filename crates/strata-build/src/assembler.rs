//! Bundle assembly planning
//!
//! An assembler turns a bundle definition into a [`BundleLayout`]: the
//! manifest plus an ordered list of destination paths and where their bytes
//! come from. Nothing is written here; see [`crate::archive`].
use crate::bundle::{ArtifactBundle, BundleId, BundleLayer, BundleSet};
use crate::error::{BuildError, BuildResult};
use crate::index::DependencyIndex;
use crate::jar_manifest::{JarManifest, MANIFEST_PATH};
use crate::locator::ArtifactLocator;
use crate::path_filter::{PathFilter, SHADED_METADATA_EXCLUDES};
use crate::resolver::ClasspathResolver;
use crate::settings::BuildSettings;
use crate::graph::QualifiedName;
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use strata_manifest::{ArtifactId, Coordinate, ModuleId};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

const SERVICES_DIR: &str = "META-INF/services/";

/// Where an entry's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// A file on disk (layer output or a nested bundle archive)
    File(PathBuf),
    /// An entry inside a library or bundle archive
    ArchiveEntry { archive: PathBuf, name: String },
    /// Bytes produced during planning (merged service files, indexes)
    Generated(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub destination: String,
    pub source: EntrySource,
    /// What contributed the entry, for diagnostics
    pub origin: String,
}

/// Complete content plan of one archive
#[derive(Debug, Clone)]
pub struct BundleLayout {
    pub bundle: QualifiedName,
    pub file_name: String,
    pub manifest: JarManifest,
    /// Entries in write order, manifest excluded
    pub entries: Vec<PlannedEntry>,
    /// Library artifacts whose contents were shaded in
    pub shaded: Vec<Coordinate>,
}

impl BundleLayout {
    pub fn destinations(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.destination.as_str()).collect()
    }

    pub fn entry(&self, destination: &str) -> Option<&PlannedEntry> {
        self.entries.iter().find(|e| e.destination == destination)
    }
}

/// Concatenate service file contributions line-wise, in order
pub fn merge_service_contents(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut merged = Vec::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        merged.extend_from_slice(part);
        if !part.ends_with(b"\n") {
            merged.push(b'\n');
        }
    }
    merged
}

pub fn is_service_file(path: &str) -> bool {
    path.strip_prefix(SERVICES_DIR)
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

fn join_prefix(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

enum Slot {
    Single(PlannedEntry),
    Services(Vec<(String, Vec<u8>)>),
}

/// Destination-keyed collection with exclusion and duplicate rules
struct LayoutPlan<'a> {
    bundle: &'a QualifiedName,
    filter: PathFilter,
    merge_services: bool,
    slots: IndexMap<String, Slot>,
}

impl<'a> LayoutPlan<'a> {
    fn new(bundle: &'a ArtifactBundle) -> BuildResult<Self> {
        let mut filter = PathFilter::new();
        if !bundle.shade.is_empty() {
            filter = filter.with_globs(SHADED_METADATA_EXCLUDES.iter().copied())?;
        }
        filter = filter.with_globs(bundle.exclude_paths.iter().map(String::as_str))?;

        Ok(Self {
            bundle: &bundle.name,
            filter,
            merge_services: bundle.merge_service_files,
            slots: IndexMap::new(),
        })
    }

    fn accepts(&self, destination: &str) -> bool {
        if destination == MANIFEST_PATH {
            return false;
        }
        match self.filter.matching(destination) {
            Some(glob) => {
                debug!("Excluding {} from {} ({})", destination, self.bundle, glob);
                false
            }
            None => true,
        }
    }

    fn merges(&self, destination: &str) -> bool {
        self.merge_services && is_service_file(destination)
    }

    fn offer(&mut self, destination: String, origin: &str, source: EntrySource) {
        match self.slots.entry(destination) {
            Entry::Occupied(existing) => {
                let kept = match existing.get() {
                    Slot::Single(entry) => entry.origin.clone(),
                    Slot::Services(parts) => parts
                        .first()
                        .map(|(o, _)| o.clone())
                        .unwrap_or_default(),
                };
                warn!(
                    "Duplicate path {} in bundle {}: keeping {}, dropping {}",
                    existing.key(),
                    self.bundle,
                    kept,
                    origin
                );
            }
            Entry::Vacant(slot) => {
                let destination = slot.key().clone();
                slot.insert(Slot::Single(PlannedEntry {
                    destination,
                    source,
                    origin: origin.to_string(),
                }));
            }
        }
    }

    fn offer_service(&mut self, destination: String, origin: &str, bytes: Vec<u8>) {
        match self.slots.entry(destination) {
            Entry::Occupied(mut existing) => match existing.get_mut() {
                Slot::Services(parts) => parts.push((origin.to_string(), bytes)),
                Slot::Single(entry) => warn!(
                    "Duplicate path {} in bundle {}: keeping {}, dropping {}",
                    entry.destination, self.bundle, entry.origin, origin
                ),
            },
            Entry::Vacant(slot) => {
                slot.insert(Slot::Services(vec![(origin.to_string(), bytes)]));
            }
        }
    }

    /// Flatten slots, then apply rename rules to destinations
    fn finish(self, bundle: &ArtifactBundle) -> Vec<PlannedEntry> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.slots.len());

        for (destination, slot) in self.slots {
            let mut entry = match slot {
                Slot::Single(entry) => entry,
                Slot::Services(parts) => {
                    if parts.len() > 1 {
                        debug!("Merging {} contributions to {}", parts.len(), destination);
                    }
                    let origin = parts
                        .iter()
                        .map(|(o, _)| o.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    let contents: Vec<Vec<u8>> = parts.into_iter().map(|(_, b)| b).collect();
                    PlannedEntry {
                        destination,
                        source: EntrySource::Generated(merge_service_contents(&contents)),
                        origin,
                    }
                }
            };

            for rule in &bundle.rename {
                let renamed = rule.apply(&entry.destination).into_owned();
                if renamed != entry.destination {
                    debug!("Renaming {} to {}", entry.destination, renamed);
                    entry.destination = renamed;
                }
            }

            if seen.insert(entry.destination.clone()) {
                entries.push(entry);
            } else {
                warn!(
                    "Duplicate path {} in bundle {} after renaming: dropping {}",
                    entry.destination, bundle.name, entry.origin
                );
            }
        }

        entries
    }
}

/// Plans bundle contents from the resolved graph
pub struct Assembler<'a> {
    resolver: &'a ClasspathResolver,
    bundles: &'a BundleSet,
    settings: &'a BuildSettings,
    locator: &'a dyn ArtifactLocator,
}

impl<'a> Assembler<'a> {
    pub fn new(
        resolver: &'a ClasspathResolver,
        bundles: &'a BundleSet,
        settings: &'a BuildSettings,
        locator: &'a dyn ArtifactLocator,
    ) -> Self {
        Self {
            resolver,
            bundles,
            settings,
            locator,
        }
    }

    /// Shaded set minus excluded sets, by module identity.
    ///
    /// Two versions of one artifact among the shaded sets are ambiguous. A
    /// shaded module whose version differs from the provided one is dropped
    /// with a warning, or rejected when provided versions are strict.
    pub fn shaded_libraries(&self, id: BundleId) -> BuildResult<Vec<Coordinate>> {
        let bundle = self.bundles.get(id);

        let mut shaded: IndexMap<ArtifactId, Coordinate> = IndexMap::new();
        for &set in &bundle.shade {
            for member in self.resolver.library_members(set) {
                let coordinate = &member.coordinate;
                let key = coordinate.artifact_id();
                match shaded.get(&key) {
                    Some(existing) if existing.version != coordinate.version => {
                        return Err(BuildError::AmbiguousVersion {
                            bundle: bundle.name.to_string(),
                            module: key.to_string(),
                            versions: format!("{}, {}", existing.version, coordinate.version),
                        });
                    }
                    Some(_) => {}
                    None => {
                        shaded.insert(key, coordinate.clone());
                    }
                }
            }
        }

        let mut provided: IndexMap<ModuleId, Vec<String>> = IndexMap::new();
        for &set in &bundle.exclude_libraries {
            for member in self.resolver.library_members(set) {
                let versions = provided.entry(member.coordinate.module_id()).or_default();
                if !versions.contains(&member.coordinate.version) {
                    versions.push(member.coordinate.version.clone());
                }
            }
        }

        let mut result = Vec::with_capacity(shaded.len());
        for (artifact, coordinate) in shaded {
            let module = artifact.module;
            let Some(versions) = provided.get(&module) else {
                result.push(coordinate);
                continue;
            };
            if !versions.contains(&coordinate.version) {
                let provided_versions = versions.join(", ");
                if self.settings.strict_provided_versions {
                    return Err(BuildError::AmbiguousVersion {
                        bundle: bundle.name.to_string(),
                        module: module.to_string(),
                        versions: format!(
                            "{} shaded, {} provided",
                            coordinate.version, provided_versions
                        ),
                    });
                }
                warn!(
                    "Bundle {} shades {} {} but {} is provided; using the provided version",
                    bundle.name, module, coordinate.version, provided_versions
                );
            }
        }

        Ok(result)
    }

    /// Plan the full contents of one bundle
    pub fn assemble_bundle(&self, id: BundleId) -> BuildResult<BundleLayout> {
        let bundle = self.bundles.get(id);
        let mut plan = LayoutPlan::new(bundle)?;

        for layer in &bundle.layers {
            self.collect_layer(&mut plan, layer)?;
        }

        if let Some(spec) = &bundle.dependency_index {
            let index = DependencyIndex::collect(spec, self.resolver, self.locator)?;
            if plan.accepts(&spec.path) {
                plan.offer(
                    spec.path.clone(),
                    "dependency index",
                    EntrySource::Generated(index.to_json()?),
                );
            }
        }

        let shaded = self.shaded_libraries(id)?;
        for coordinate in &shaded {
            let archive = self.locator.locate(coordinate)?;
            self.collect_archive(&mut plan, &archive, &format!("library {}", coordinate))?;
        }

        for &inline in &bundle.inline {
            let inlined = self.bundles.get(inline);
            let archive = self.settings.output_dir.join(&inlined.file_name);
            self.collect_archive(&mut plan, &archive, &format!("bundle {}", inlined.name))?;
        }

        for nested in &bundle.nest {
            let inner = self.bundles.get(nested.bundle);
            let archive = self.settings.output_dir.join(&inner.file_name);
            if !archive.is_file() {
                return Err(BuildError::io(
                    archive,
                    io::Error::new(io::ErrorKind::NotFound, "nested bundle archive missing"),
                ));
            }
            let destination = join_prefix(&nested.into, &inner.file_name);
            if plan.accepts(&destination) {
                plan.offer(
                    destination,
                    &format!("bundle {}", inner.name),
                    EntrySource::File(archive),
                );
            }
        }

        let entries = plan.finish(bundle);
        debug!("Planned {} entries for {}", entries.len(), bundle.name);

        Ok(BundleLayout {
            bundle: bundle.name.clone(),
            file_name: bundle.file_name.clone(),
            manifest: self.bundles.effective_manifest(id),
            entries,
            shaded,
        })
    }

    fn collect_layer(&self, plan: &mut LayoutPlan<'_>, layer: &BundleLayer) -> BuildResult<()> {
        let node = self.resolver.graph().layer(layer.layer);
        let dir = self.settings.layer_output_dir(node);
        if !dir.is_dir() {
            warn!(
                "Output of layer {} not found at {}; contributing nothing",
                node.key,
                dir.display()
            );
            return Ok(());
        }

        let origin = format!("layer {}", node.key);
        let prefix = layer.prefix.as_deref().unwrap_or("");
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                BuildError::io(path, io::Error::from(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&dir)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let destination = join_prefix(prefix, &relative);
            if !plan.accepts(&destination) {
                continue;
            }

            if plan.merges(&destination) {
                let bytes = fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;
                plan.offer_service(destination, &origin, bytes);
            } else {
                plan.offer(destination, &origin, EntrySource::File(entry.into_path()));
            }
        }

        Ok(())
    }

    fn collect_archive(
        &self,
        plan: &mut LayoutPlan<'_>,
        archive: &Path,
        origin: &str,
    ) -> BuildResult<()> {
        let file = File::open(archive).map_err(|e| BuildError::io(archive, e))?;
        let mut zip =
            ZipArchive::new(BufReader::new(file)).map_err(|e| BuildError::archive(archive, e))?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| BuildError::archive(archive, e))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            if !plan.accepts(&name) {
                continue;
            }

            if plan.merges(&name) {
                let mut bytes = Vec::new();
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| BuildError::io(archive, e))?;
                plan.offer_service(name, origin, bytes);
            } else {
                plan.offer(
                    name.clone(),
                    origin,
                    EntrySource::ArchiveEntry {
                        archive: archive.to_path_buf(),
                        name,
                    },
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_merge_service_contents() {
        let merged = merge_service_contents(&[b"a\nb\n".to_vec(), b"c\nd".to_vec(), Vec::new()]);
        assert_eq!(merged, b"a\nb\nc\nd\n".to_vec());
    }

    #[rstest]
    #[case("META-INF/services/java.sql.Driver", true)]
    #[case("META-INF/services/", false)]
    #[case("META-INF/services/nested/Thing", false)]
    #[case("META-INF/MANIFEST.MF", false)]
    fn test_is_service_file(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_service_file(path), expected);
    }

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix("", "a/B.class"), "a/B.class");
        assert_eq!(join_prefix("launch/", "a/B.class"), "launch/a/B.class");
        assert_eq!(join_prefix("/jars/", "x.jar"), "jars/x.jar");
    }
}
