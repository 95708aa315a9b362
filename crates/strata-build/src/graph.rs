//! Layer graph: variants, layers, library sets and the edges between them
//!
//! Every insertion is validated on the spot. A rejected edge leaves the graph
//! exactly as it was, so a graph that exists is always acyclic over compile
//! edges and only ever points from a variant to itself or its ancestors.
use crate::error::{BuildError, BuildResult};
use crate::library::ResolutionRules;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use strata_manifest::{Coordinate, ExclusionRule};
use tracing::debug;

/// Name scoped to a project variant, displayed as `variant:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QualifiedName {
    pub variant: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(variant: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            name: name.into(),
        }
    }

    /// Parse `name` (within `context_variant`) or `variant:name`
    pub fn from_reference(context_variant: &str, reference: &str) -> Self {
        match reference.split_once(':') {
            Some((variant, name)) => Self::new(variant, name),
            None => Self::new(context_variant, reference),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.variant, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibrarySetHandle(usize);

impl LayerHandle {
    /// Position in declaration order
    pub fn index(self) -> usize {
        self.0
    }
}

impl LibrarySetHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// When an edge's target is visible to the depending layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible while compiling and at runtime; imposes build order
    Compile,
    /// Visible at runtime only
    Runtime,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Compile => write!(f, "compile"),
            Visibility::Runtime => write!(f, "runtime"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectVariant {
    pub name: String,
    pub parent: Option<VariantId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<T> {
    pub to: T,
    pub visibility: Visibility,
}

/// A compilation unit within one variant
#[derive(Debug, Clone)]
pub struct LayerNode {
    pub key: QualifiedName,
    pub variant: VariantId,
    /// Output-dependency edges in declaration order
    pub outputs: Vec<Edge<LayerHandle>>,
    /// Library-set edges in declaration order
    pub libraries: Vec<Edge<LibrarySetHandle>>,
    /// Compiled output directory override
    pub output_dir: Option<PathBuf>,
}

/// One declared artifact of a library set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMember {
    pub coordinate: Coordinate,
    /// Transitive exclusions forwarded with the artifact
    pub exclusions: Vec<ExclusionRule>,
}

impl LibraryMember {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            exclusions: Vec::new(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<ExclusionRule>) -> Self {
        self.exclusions = exclusions;
        self
    }
}

/// Membership of `from` minus every module in `provided`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub from: LibrarySetHandle,
    pub provided: Vec<LibrarySetHandle>,
}

#[derive(Debug, Clone)]
pub struct LibrarySetNode {
    pub key: QualifiedName,
    pub variant: VariantId,
    pub members: Vec<LibraryMember>,
    pub extends: Vec<LibrarySetHandle>,
    pub exclusions: Vec<ExclusionRule>,
    pub derivation: Option<Derivation>,
}

impl LibrarySetNode {
    /// Sets this set's membership is computed from
    fn dependencies(&self) -> Vec<usize> {
        let mut deps: Vec<usize> = self.extends.iter().map(|h| h.0).collect();
        if let Some(derivation) = &self.derivation {
            deps.push(derivation.from.0);
            deps.extend(derivation.provided.iter().map(|h| h.0));
        }
        deps
    }
}

/// Graph of layers and library sets across all project variants
#[derive(Debug, Clone, Default)]
pub struct LayerGraph {
    variants: Vec<ProjectVariant>,
    variant_index: HashMap<String, VariantId>,
    layers: Vec<LayerNode>,
    layer_index: HashMap<QualifiedName, LayerHandle>,
    library_sets: Vec<LibrarySetNode>,
    library_index: HashMap<QualifiedName, LibrarySetHandle>,
    resolution: ResolutionRules,
    frozen: bool,
}

impl LayerGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a project variant; the parent must already exist
    pub fn define_variant(&mut self, name: &str, parent: Option<&str>) -> BuildResult<VariantId> {
        self.ensure_mutable(|| format!("define variant '{}'", name))?;
        if self.variant_index.contains_key(name) {
            return Err(BuildError::InvalidDeclaration(format!(
                "variant '{}' is defined twice",
                name
            )));
        }

        let parent = parent
            .map(|p| {
                self.variant_id(p).ok_or_else(|| {
                    BuildError::unknown_reference("variant", p, format!("variant '{}'", name))
                })
            })
            .transpose()?;

        let id = VariantId(self.variants.len());
        self.variants.push(ProjectVariant {
            name: name.to_string(),
            parent,
        });
        self.variant_index.insert(name.to_string(), id);
        debug!("Defined variant {}", name);
        Ok(id)
    }

    /// Define a layer; defining an existing key returns its handle
    pub fn define_layer(&mut self, name: &str, variant: &str) -> BuildResult<LayerHandle> {
        self.ensure_mutable(|| format!("define layer '{}:{}'", variant, name))?;
        let variant_id = self.variant_id(variant).ok_or_else(|| {
            BuildError::unknown_reference("variant", variant, format!("layer '{}'", name))
        })?;

        let key = QualifiedName::new(variant, name);
        if let Some(&handle) = self.layer_index.get(&key) {
            return Ok(handle);
        }

        let handle = LayerHandle(self.layers.len());
        debug!("Defined layer {}", key);
        self.layers.push(LayerNode {
            key: key.clone(),
            variant: variant_id,
            outputs: Vec::new(),
            libraries: Vec::new(),
            output_dir: None,
        });
        self.layer_index.insert(key, handle);
        Ok(handle)
    }

    /// Override where a layer's compiled output lives
    pub fn set_layer_output(&mut self, layer: LayerHandle, dir: PathBuf) -> BuildResult<()> {
        self.ensure_mutable(|| format!("set output of {}", self.layers[layer.0].key))?;
        self.layers[layer.0].output_dir = Some(dir);
        Ok(())
    }

    /// Define a library set with its directly declared members
    pub fn define_library_set(
        &mut self,
        name: &str,
        variant: &str,
        members: Vec<LibraryMember>,
    ) -> BuildResult<LibrarySetHandle> {
        self.ensure_mutable(|| format!("define library set '{}:{}'", variant, name))?;
        let variant_id = self.variant_id(variant).ok_or_else(|| {
            BuildError::unknown_reference("variant", variant, format!("library set '{}'", name))
        })?;

        let key = QualifiedName::new(variant, name);
        if self.library_index.contains_key(&key) {
            return Err(BuildError::InvalidDeclaration(format!(
                "library set '{}' is defined twice",
                key
            )));
        }

        let handle = LibrarySetHandle(self.library_sets.len());
        debug!("Defined library set {} with {} members", key, members.len());
        self.library_sets.push(LibrarySetNode {
            key: key.clone(),
            variant: variant_id,
            members,
            extends: Vec::new(),
            exclusions: Vec::new(),
            derivation: None,
        });
        self.library_index.insert(key, handle);
        Ok(handle)
    }

    /// Make `set` inherit every member of `parent`
    pub fn add_library_extends(
        &mut self,
        set: LibrarySetHandle,
        parent: LibrarySetHandle,
    ) -> BuildResult<()> {
        self.ensure_mutable(|| {
            format!(
                "extend {} from {}",
                self.library_sets[set.0].key, self.library_sets[parent.0].key
            )
        })?;
        self.check_library_reference(set, parent)?;
        if self.library_sets[set.0].extends.contains(&parent) {
            return Ok(());
        }
        self.check_library_cycle(set, parent)?;

        debug!(
            "Library set {} extends {}",
            self.library_sets[set.0].key, self.library_sets[parent.0].key
        );
        self.library_sets[set.0].extends.push(parent);
        Ok(())
    }

    /// Compute `set` as `from` minus the modules of `provided`
    pub fn set_library_derivation(
        &mut self,
        set: LibrarySetHandle,
        from: LibrarySetHandle,
        provided: Vec<LibrarySetHandle>,
    ) -> BuildResult<()> {
        self.ensure_mutable(|| format!("derive {}", self.library_sets[set.0].key))?;
        let derivation = Derivation { from, provided };
        match &self.library_sets[set.0].derivation {
            Some(existing) if *existing == derivation => return Ok(()),
            Some(_) => {
                return Err(BuildError::InvalidDeclaration(format!(
                    "library set '{}' already has a different derivation",
                    self.library_sets[set.0].key
                )))
            }
            None => {}
        }

        for &source in std::iter::once(&derivation.from).chain(&derivation.provided) {
            self.check_library_reference(set, source)?;
            self.check_library_cycle(set, source)?;
        }

        self.library_sets[set.0].derivation = Some(derivation);
        Ok(())
    }

    /// Exclusions applied to the flattened membership of `set`
    pub fn set_library_exclusions(
        &mut self,
        set: LibrarySetHandle,
        exclusions: Vec<ExclusionRule>,
    ) -> BuildResult<()> {
        self.ensure_mutable(|| format!("exclude from {}", self.library_sets[set.0].key))?;
        self.library_sets[set.0].exclusions = exclusions;
        Ok(())
    }

    /// Global forced versions and exclusions
    pub fn set_resolution_rules(&mut self, rules: ResolutionRules) -> BuildResult<()> {
        self.ensure_mutable(|| "change resolution rules".to_string())?;
        self.resolution = rules;
        Ok(())
    }

    /// Add a layer output dependency
    pub fn add_output_edge(
        &mut self,
        from: LayerHandle,
        to: LayerHandle,
        visibility: Visibility,
    ) -> BuildResult<()> {
        self.ensure_mutable(|| {
            format!(
                "add edge {} -> {}",
                self.layers[from.0].key, self.layers[to.0].key
            )
        })?;
        let from_node = &self.layers[from.0];
        let to_node = &self.layers[to.0];
        self.check_cross_variant(from_node.variant, to_node.variant, &from_node.key, &to_node.key)?;

        let edge = Edge { to, visibility };
        if from_node.outputs.contains(&edge) {
            return Ok(());
        }

        if from == to {
            let name = from_node.key.to_string();
            return Err(BuildError::cycle("layer", &[name.clone(), name]));
        }

        if visibility == Visibility::Compile {
            let back_path = find_path(to.0, from.0, |i| self.compile_dependencies(i));
            if let Some(path) = back_path {
                let mut names = vec![from_node.key.to_string()];
                names.extend(path.into_iter().map(|i| self.layers[i].key.to_string()));
                return Err(BuildError::cycle("layer", &names));
            }
        }

        debug!(
            "Edge {} -> {} ({})",
            self.layers[from.0].key, self.layers[to.0].key, visibility
        );
        self.layers[from.0].outputs.push(edge);
        Ok(())
    }

    /// Add a library-set dependency to a layer
    pub fn add_library_edge(
        &mut self,
        from: LayerHandle,
        to: LibrarySetHandle,
        visibility: Visibility,
    ) -> BuildResult<()> {
        self.ensure_mutable(|| {
            format!(
                "add edge {} -> {}",
                self.layers[from.0].key, self.library_sets[to.0].key
            )
        })?;
        let from_node = &self.layers[from.0];
        let to_node = &self.library_sets[to.0];
        self.check_cross_variant(from_node.variant, to_node.variant, &from_node.key, &to_node.key)?;

        let edge = Edge { to, visibility };
        if from_node.libraries.contains(&edge) {
            return Ok(());
        }

        debug!(
            "Edge {} -> libraries {} ({})",
            from_node.key, to_node.key, visibility
        );
        self.layers[from.0].libraries.push(edge);
        Ok(())
    }

    /// Resolve a layer reference made from within `variant`
    pub fn lookup_layer(
        &self,
        variant: &str,
        reference: &str,
        referrer: &str,
    ) -> BuildResult<LayerHandle> {
        self.find_layer(&QualifiedName::from_reference(variant, reference))
            .ok_or_else(|| BuildError::unknown_reference("layer", reference, referrer))
    }

    /// Resolve a library-set reference made from within `variant`
    pub fn lookup_library_set(
        &self,
        variant: &str,
        reference: &str,
        referrer: &str,
    ) -> BuildResult<LibrarySetHandle> {
        self.find_library_set(&QualifiedName::from_reference(variant, reference))
            .ok_or_else(|| BuildError::unknown_reference("library set", reference, referrer))
    }

    pub fn find_layer(&self, key: &QualifiedName) -> Option<LayerHandle> {
        self.layer_index.get(key).copied()
    }

    pub fn find_library_set(&self, key: &QualifiedName) -> Option<LibrarySetHandle> {
        self.library_index.get(key).copied()
    }

    pub fn variant_id(&self, name: &str) -> Option<VariantId> {
        self.variant_index.get(name).copied()
    }

    pub fn variant(&self, id: VariantId) -> &ProjectVariant {
        &self.variants[id.0]
    }

    pub fn variants(&self) -> &[ProjectVariant] {
        &self.variants
    }

    pub fn layer(&self, handle: LayerHandle) -> &LayerNode {
        &self.layers[handle.0]
    }

    /// All layers in declaration order
    pub fn layers(&self) -> impl Iterator<Item = (LayerHandle, &LayerNode)> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, node)| (LayerHandle(i), node))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn library_set(&self, handle: LibrarySetHandle) -> &LibrarySetNode {
        &self.library_sets[handle.0]
    }

    pub fn library_sets(&self) -> impl Iterator<Item = (LibrarySetHandle, &LibrarySetNode)> {
        self.library_sets
            .iter()
            .enumerate()
            .map(|(i, node)| (LibrarySetHandle(i), node))
    }

    pub fn resolution(&self) -> &ResolutionRules {
        &self.resolution
    }

    /// Whether `ancestor` is `variant` or one of its parents
    pub fn is_ancestor_or_self(&self, ancestor: VariantId, variant: VariantId) -> bool {
        let mut current = Some(variant);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.variants[id.0].parent;
        }
        false
    }

    /// Fail unless `to_variant` is visible from `from_variant`
    pub fn check_cross_variant(
        &self,
        from_variant: VariantId,
        to_variant: VariantId,
        from: &dyn fmt::Display,
        to: &dyn fmt::Display,
    ) -> BuildResult<()> {
        if self.is_ancestor_or_self(to_variant, from_variant) {
            Ok(())
        } else {
            Err(BuildError::InvalidCrossProjectEdge {
                from: from.to_string(),
                to: to.to_string(),
                from_variant: self.variants[from_variant.0].name.clone(),
                to_variant: self.variants[to_variant.0].name.clone(),
            })
        }
    }

    /// Reject further mutation
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Topological order over compile edges; ties keep declaration order
    pub fn build_order(&self) -> BuildResult<Vec<LayerHandle>> {
        let deps: Vec<HashSet<usize>> = (0..self.layers.len())
            .map(|i| self.compile_dependencies(i).into_iter().collect())
            .collect();

        let mut dependents = vec![Vec::new(); self.layers.len()];
        for (i, layer_deps) in deps.iter().enumerate() {
            for &dep in layer_deps {
                dependents[dep].push(i);
            }
        }

        let mut in_degree: Vec<usize> = deps.iter().map(HashSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.layers.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.layers.len());

        while let Some(i) = ready.pop_first() {
            order.push(LayerHandle(i));
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.layers.len() {
            return Err(self.find_cycle());
        }

        Ok(order)
    }

    /// Groups of layers whose compile dependencies are all in earlier groups
    pub fn parallel_build_groups(&self) -> BuildResult<Vec<Vec<LayerHandle>>> {
        let mut groups = Vec::new();
        let mut built = vec![false; self.layers.len()];
        let mut remaining = self.layers.len();

        while remaining > 0 {
            let group: Vec<usize> = (0..self.layers.len())
                .filter(|&i| !built[i])
                .filter(|&i| self.compile_dependencies(i).iter().all(|&d| built[d]))
                .collect();

            if group.is_empty() {
                return Err(self.find_cycle());
            }

            for &i in &group {
                built[i] = true;
            }
            remaining -= group.len();
            groups.push(group.into_iter().map(LayerHandle).collect());
        }

        Ok(groups)
    }

    fn ensure_mutable(&self, operation: impl FnOnce() -> String) -> BuildResult<()> {
        if self.frozen {
            Err(BuildError::GraphFrozen {
                operation: operation(),
            })
        } else {
            Ok(())
        }
    }

    fn compile_dependencies(&self, layer: usize) -> Vec<usize> {
        self.layers[layer]
            .outputs
            .iter()
            .filter(|edge| edge.visibility == Visibility::Compile)
            .map(|edge| edge.to.0)
            .collect()
    }

    fn check_library_reference(
        &self,
        set: LibrarySetHandle,
        target: LibrarySetHandle,
    ) -> BuildResult<()> {
        let set_node = &self.library_sets[set.0];
        let target_node = &self.library_sets[target.0];
        self.check_cross_variant(set_node.variant, target_node.variant, &set_node.key, &target_node.key)
    }

    fn check_library_cycle(&self, set: LibrarySetHandle, target: LibrarySetHandle) -> BuildResult<()> {
        let key = |i: usize| self.library_sets[i].key.to_string();
        if set == target {
            return Err(BuildError::cycle("library set", &[key(set.0), key(set.0)]));
        }
        if let Some(path) = find_path(target.0, set.0, |i| self.library_sets[i].dependencies()) {
            let mut names = vec![key(set.0)];
            names.extend(path.into_iter().map(key));
            return Err(BuildError::cycle("library set", &names));
        }
        Ok(())
    }

    /// Locate a compile cycle for error reporting
    fn find_cycle(&self) -> BuildError {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for start in 0..self.layers.len() {
            if let Some(cycle) = self.dfs_find_cycle(start, &mut visited, &mut stack) {
                let names: Vec<String> = cycle
                    .into_iter()
                    .map(|i| self.layers[i].key.to_string())
                    .collect();
                return BuildError::cycle("layer", &names);
            }
        }

        BuildError::cycle("layer", &["unknown".to_string()])
    }

    fn dfs_find_cycle(
        &self,
        layer: usize,
        visited: &mut HashSet<usize>,
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        if let Some(start) = stack.iter().position(|&i| i == layer) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(layer);
            return Some(cycle);
        }
        if !visited.insert(layer) {
            return None;
        }

        stack.push(layer);
        for dep in self.compile_dependencies(layer) {
            if let Some(cycle) = self.dfs_find_cycle(dep, visited, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        None
    }
}

/// Breadth-first search for a path `start ..= goal`
fn find_path<F>(start: usize, goal: usize, successors: F) -> Option<Vec<usize>>
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut previous: HashMap<usize, usize> = HashMap::new();
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        if current == goal {
            let mut path = vec![goal];
            let mut node = goal;
            while let Some(&prev) = previous.get(&node) {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Some(path);
        }
        for next in successors(current) {
            if seen.insert(next) {
                previous.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    None
}
