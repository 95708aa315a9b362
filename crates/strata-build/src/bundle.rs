//! Bundle definitions and bundle-level ordering
use crate::error::{BuildError, BuildResult};
use crate::graph::{LayerHandle, LibrarySetHandle, QualifiedName};
use crate::jar_manifest::JarManifest;
use indexmap::IndexMap;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(usize);

impl BundleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of bundle, derived from what it pulls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// Layer outputs only
    Plain,
    /// Layer outputs plus shaded library contents
    Shaded,
    /// Built from other bundles' archives
    Universal,
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Shaded => write!(f, "shaded"),
            Self::Universal => write!(f, "universal"),
        }
    }
}

/// A layer's output tree placed in a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayer {
    pub layer: LayerHandle,
    /// Directory prefix inside the archive, `None` for the root
    pub prefix: Option<String>,
}

/// Regex substitution on destination paths
#[derive(Debug, Clone)]
pub struct RenameRule {
    pub pattern: Regex,
    pub replacement: String,
}

impl RenameRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> BuildResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            BuildError::InvalidDeclaration(format!("invalid rename pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(path, self.replacement.as_str())
    }
}

/// Another bundle's archive embedded as a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedBundle {
    pub bundle: BundleId,
    /// Directory the archive is placed in, empty for the root
    pub into: String,
}

/// Generated JSON resource listing library coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyIndexSpec {
    pub path: String,
    pub sections: IndexMap<String, Vec<LibrarySetHandle>>,
    pub exclude: Vec<LibrarySetHandle>,
}

/// A bundle: one output archive
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    pub name: QualifiedName,
    /// Archive file name inside the output directory
    pub file_name: String,
    pub layers: Vec<BundleLayer>,
    pub shade: Vec<LibrarySetHandle>,
    pub exclude_libraries: Vec<LibrarySetHandle>,
    pub exclude_paths: Vec<String>,
    pub merge_service_files: bool,
    /// Attributes declared for this bundle, base attributes included
    pub manifest: JarManifest,
    pub manifest_from: Option<BundleId>,
    pub rename: Vec<RenameRule>,
    pub inline: Vec<BundleId>,
    pub nest: Vec<NestedBundle>,
    pub dependency_index: Option<DependencyIndexSpec>,
}

impl ArtifactBundle {
    pub fn new(name: QualifiedName, file_name: impl Into<String>) -> Self {
        Self {
            name,
            file_name: file_name.into(),
            layers: Vec::new(),
            shade: Vec::new(),
            exclude_libraries: Vec::new(),
            exclude_paths: Vec::new(),
            merge_service_files: true,
            manifest: JarManifest::new(),
            manifest_from: None,
            rename: Vec::new(),
            inline: Vec::new(),
            nest: Vec::new(),
            dependency_index: None,
        }
    }

    pub fn with_layer(mut self, layer: LayerHandle, prefix: Option<String>) -> Self {
        self.layers.push(BundleLayer { layer, prefix });
        self
    }

    pub fn with_shade(mut self, sets: Vec<LibrarySetHandle>) -> Self {
        self.shade = sets;
        self
    }

    pub fn with_excluded_libraries(mut self, sets: Vec<LibrarySetHandle>) -> Self {
        self.exclude_libraries = sets;
        self
    }

    pub fn with_manifest(mut self, manifest: JarManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn kind(&self) -> BundleKind {
        if !self.inline.is_empty() || !self.nest.is_empty() {
            BundleKind::Universal
        } else if !self.shade.is_empty() {
            BundleKind::Shaded
        } else {
            BundleKind::Plain
        }
    }

    /// Bundles that must be built (or described) before this one
    pub fn dependencies(&self) -> Vec<BundleId> {
        let mut seen = HashSet::new();
        self.manifest_from
            .iter()
            .chain(&self.inline)
            .chain(self.nest.iter().map(|n| &n.bundle))
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// All bundles of a project, in declaration order
#[derive(Debug, Clone, Default)]
pub struct BundleSet {
    bundles: Vec<ArtifactBundle>,
    index: HashMap<QualifiedName, BundleId>,
}

impl BundleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bundle: ArtifactBundle) -> BuildResult<BundleId> {
        if self.index.contains_key(&bundle.name) {
            return Err(BuildError::InvalidDeclaration(format!(
                "bundle '{}' is defined twice",
                bundle.name
            )));
        }
        let id = BundleId(self.bundles.len());
        self.index.insert(bundle.name.clone(), id);
        self.bundles.push(bundle);
        Ok(id)
    }

    pub fn get(&self, id: BundleId) -> &ArtifactBundle {
        &self.bundles[id.0]
    }

    pub fn get_mut(&mut self, id: BundleId) -> &mut ArtifactBundle {
        &mut self.bundles[id.0]
    }

    pub fn find(&self, name: &QualifiedName) -> Option<BundleId> {
        self.index.get(name).copied()
    }

    /// Resolve a bundle reference made from within `variant`
    pub fn lookup(&self, variant: &str, reference: &str, referrer: &str) -> BuildResult<BundleId> {
        self.find(&QualifiedName::from_reference(variant, reference))
            .ok_or_else(|| BuildError::unknown_reference("bundle", reference, referrer))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BundleId, &ArtifactBundle)> {
        self.bundles
            .iter()
            .enumerate()
            .map(|(i, bundle)| (BundleId(i), bundle))
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Groups of bundles whose dependencies are all in earlier groups
    pub fn build_groups(&self) -> BuildResult<Vec<Vec<BundleId>>> {
        let mut groups = Vec::new();
        let mut built = vec![false; self.bundles.len()];
        let mut remaining = self.bundles.len();

        while remaining > 0 {
            let group: Vec<BundleId> = self
                .iter()
                .filter(|(id, _)| !built[id.0])
                .filter(|(_, bundle)| bundle.dependencies().iter().all(|d| built[d.0]))
                .map(|(id, _)| id)
                .collect();

            if group.is_empty() {
                return Err(self.find_cycle(&built));
            }

            for id in &group {
                built[id.0] = true;
            }
            remaining -= group.len();
            groups.push(group);
        }

        Ok(groups)
    }

    /// `ids` plus everything they depend on, in declaration order
    pub fn with_dependencies(&self, ids: &[BundleId]) -> Vec<BundleId> {
        let mut selected = vec![false; self.bundles.len()];
        let mut stack: Vec<BundleId> = ids.to_vec();
        while let Some(id) = stack.pop() {
            if !selected[id.0] {
                selected[id.0] = true;
                stack.extend(self.bundles[id.0].dependencies());
            }
        }
        (0..self.bundles.len())
            .filter(|&i| selected[i])
            .map(BundleId)
            .collect()
    }

    /// Declared attributes layered over the `manifest_from` chain
    pub fn effective_manifest(&self, id: BundleId) -> JarManifest {
        let mut manifest = self.bundles[id.0].manifest.clone();
        let mut visited = HashSet::from([id]);
        let mut current = self.bundles[id.0].manifest_from;

        while let Some(from) = current {
            if !visited.insert(from) {
                break;
            }
            manifest.inherit(&self.bundles[from.0].manifest);
            current = self.bundles[from.0].manifest_from;
        }

        manifest
    }

    fn find_cycle(&self, built: &[bool]) -> BuildError {
        // Every unbuilt bundle has an unbuilt dependency; following them must loop.
        let Some(start) = (0..self.bundles.len()).find(|&i| !built[i]) else {
            return BuildError::cycle("bundle", &["unknown".to_string()]);
        };

        let mut path = vec![start];
        loop {
            let current = path[path.len() - 1];
            let next = self.bundles[current]
                .dependencies()
                .into_iter()
                .map(|d| d.0)
                .find(|&d| !built[d]);
            let Some(next) = next else {
                return BuildError::cycle("bundle", &["unknown".to_string()]);
            };
            if let Some(pos) = path.iter().position(|&i| i == next) {
                let mut names: Vec<String> = path[pos..]
                    .iter()
                    .map(|&i| self.bundles[i].name.to_string())
                    .collect();
                names.push(self.bundles[next].name.to_string());
                return BuildError::cycle("bundle", &names);
            }
            path.push(next);
        }
    }
}
