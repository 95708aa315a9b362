//! Classpath resolution over a frozen layer graph
//!
//! Resolution is eager. The resolver owns the graph, freezes it, and fills
//! one write-once slot per layer and visibility. Slots are filled on rayon
//! workers; each worker only reads the graph and writes its own slot.
//!
//! Library versions are chosen once per layer over the runtime closure and
//! the compile classpath is pinned to those choices, so every compile
//! coordinate is also a runtime coordinate.
use crate::error::{BuildError, BuildResult};
use crate::graph::{LayerGraph, LayerHandle, LibraryMember, LibrarySetHandle, QualifiedName, Visibility};
use crate::library::{flatten, NewestVersionSet};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use strata_manifest::{ArtifactId, Coordinate};
use tracing::debug;

/// Everything visible to one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classpath {
    /// Layers whose outputs are visible, in traversal order
    pub layers: Vec<QualifiedName>,
    /// Library coordinates, one version per artifact
    pub libraries: Vec<Coordinate>,
}

impl Classpath {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.libraries.is_empty()
    }

    pub fn contains_layer(&self, key: &QualifiedName) -> bool {
        self.layers.contains(key)
    }

    pub fn library_file_names(&self) -> Vec<String> {
        self.libraries.iter().map(Coordinate::file_name).collect()
    }
}

pub struct ClasspathResolver {
    graph: LayerGraph,
    flattened: Vec<Vec<LibraryMember>>,
    compile: Vec<OnceLock<Arc<Classpath>>>,
    runtime: Vec<OnceLock<Arc<Classpath>>>,
}

impl ClasspathResolver {
    /// Freeze `graph` and resolve every layer on worker threads
    pub fn new(graph: LayerGraph) -> Self {
        Self::with_parallelism(graph, true)
    }

    pub fn with_parallelism(mut graph: LayerGraph, parallel: bool) -> Self {
        let start = Instant::now();
        graph.freeze();

        let flattened = graph
            .library_sets()
            .map(|(handle, _)| flatten(&graph, handle))
            .collect();
        let layer_count = graph.layer_count();
        let resolver = Self {
            compile: (0..layer_count).map(|_| OnceLock::new()).collect(),
            runtime: (0..layer_count).map(|_| OnceLock::new()).collect(),
            flattened,
            graph,
        };

        let handles: Vec<LayerHandle> = resolver.graph.layers().map(|(h, _)| h).collect();
        if parallel {
            handles.par_iter().for_each(|&h| resolver.resolve_layer(h));
        } else {
            handles.iter().for_each(|&h| resolver.resolve_layer(h));
        }

        debug!(
            "Resolved {} layers in {:?}",
            handles.len(),
            start.elapsed()
        );
        resolver
    }

    /// Outputs and libraries visible while compiling `layer`
    pub fn resolve_compile_visibility(&self, layer: &QualifiedName) -> BuildResult<Arc<Classpath>> {
        Ok(self.compile_classpath(self.handle(layer)?))
    }

    /// Outputs and libraries visible when `layer` runs
    pub fn resolve_runtime_visibility(&self, layer: &QualifiedName) -> BuildResult<Arc<Classpath>> {
        Ok(self.runtime_classpath(self.handle(layer)?))
    }

    pub fn compile_classpath(&self, layer: LayerHandle) -> Arc<Classpath> {
        self.compile[layer.index()]
            .get_or_init(|| {
                let runtime = self.runtime_classpath(layer);
                let mut classpath = self.traverse(layer, Visibility::Compile);
                self.pin_versions(layer, &mut classpath, &runtime);
                Arc::new(classpath)
            })
            .clone()
    }

    pub fn runtime_classpath(&self, layer: LayerHandle) -> Arc<Classpath> {
        self.runtime[layer.index()]
            .get_or_init(|| Arc::new(self.traverse(layer, Visibility::Runtime)))
            .clone()
    }

    /// Runtime library file names joined with `;`, for launch properties
    pub fn runtime_file_names(&self, layer: &QualifiedName) -> BuildResult<String> {
        Ok(self
            .resolve_runtime_visibility(layer)?
            .library_file_names()
            .join(";"))
    }

    /// Flattened membership of a library set
    pub fn library_members(&self, set: LibrarySetHandle) -> &[LibraryMember] {
        &self.flattened[set.index()]
    }

    pub fn graph(&self) -> &LayerGraph {
        &self.graph
    }

    /// Give the frozen graph back
    pub fn into_graph(self) -> LayerGraph {
        self.graph
    }

    fn handle(&self, layer: &QualifiedName) -> BuildResult<LayerHandle> {
        self.graph
            .find_layer(layer)
            .ok_or_else(|| BuildError::UnknownLayer {
                layer: layer.to_string(),
            })
    }

    fn resolve_layer(&self, layer: LayerHandle) {
        self.compile_classpath(layer);
        self.runtime_classpath(layer);
    }

    /// Replace compile library versions with the ones chosen for `runtime`
    fn pin_versions(&self, layer: LayerHandle, classpath: &mut Classpath, runtime: &Classpath) {
        let chosen: HashMap<ArtifactId, &Coordinate> = runtime
            .libraries
            .iter()
            .map(|c| (c.artifact_id(), c))
            .collect();

        for library in &mut classpath.libraries {
            if let Some(&winner) = chosen.get(&library.artifact_id()) {
                if winner != library {
                    debug!(
                        "Compiling {} against {} instead of {} to match its runtime classpath",
                        self.graph.layer(layer).key,
                        winner,
                        library
                    );
                    *library = winner.clone();
                }
            }
        }
    }

    /// Breadth-first walk from `start` in edge declaration order
    fn traverse(&self, start: LayerHandle, visibility: Visibility) -> Classpath {
        let follows =
            |edge: Visibility| visibility == Visibility::Runtime || edge == Visibility::Compile;

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut seen_sets = HashSet::new();
        let mut layers = Vec::new();
        let mut libraries = NewestVersionSet::new();

        while let Some(current) = queue.pop_front() {
            let node = self.graph.layer(current);
            if current != start {
                layers.push(node.key.clone());
            }

            for edge in node.libraries.iter().filter(|e| follows(e.visibility)) {
                if seen_sets.insert(edge.to) {
                    for member in &self.flattened[edge.to.index()] {
                        libraries.insert(member.coordinate.clone());
                    }
                }
            }

            for edge in node.outputs.iter().filter(|e| follows(e.visibility)) {
                if visited.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }

        Classpath {
            layers,
            libraries: libraries.into_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(name: &str) -> QualifiedName {
        QualifiedName::new("common", name)
    }

    fn coordinate(coord: &str) -> LibraryMember {
        LibraryMember::new(Coordinate::parse(coord).unwrap())
    }

    fn sample_graph() -> LayerGraph {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let applaunch = graph.define_layer("applaunch", "common").unwrap();
        let launch = graph.define_layer("launch", "common").unwrap();
        let mixins = graph.define_layer("mixins", "common").unwrap();
        let main = graph.define_layer("main", "common").unwrap();

        let boot = graph
            .define_library_set("applaunch", "common", vec![coordinate("com.google.guava:guava:21.0")])
            .unwrap();
        let game = graph
            .define_library_set(
                "game",
                "common",
                vec![
                    coordinate("com.google.guava:guava:17.0"),
                    coordinate("org.ow2.asm:asm:9.2"),
                ],
            )
            .unwrap();
        let mixin_runtime = graph
            .define_library_set("mixinRuntime", "common", vec![coordinate("org.spongepowered:mixin:0.8.5")])
            .unwrap();

        graph.add_output_edge(launch, applaunch, Visibility::Compile).unwrap();
        graph.add_output_edge(main, launch, Visibility::Compile).unwrap();
        graph.add_output_edge(mixins, main, Visibility::Compile).unwrap();
        graph.add_output_edge(main, mixins, Visibility::Runtime).unwrap();
        graph.add_library_edge(applaunch, boot, Visibility::Compile).unwrap();
        graph.add_library_edge(main, game, Visibility::Compile).unwrap();
        graph.add_library_edge(mixins, mixin_runtime, Visibility::Runtime).unwrap();
        graph
    }

    #[test]
    fn test_compile_visibility_is_transitive() {
        let resolver = ClasspathResolver::new(sample_graph());
        let classpath = resolver.resolve_compile_visibility(&key("main")).unwrap();

        assert_eq!(classpath.layers, vec![key("launch"), key("applaunch")]);
        let libs: Vec<String> = classpath.libraries.iter().map(ToString::to_string).collect();
        assert_eq!(libs, vec!["com.google.guava:guava:21.0", "org.ow2.asm:asm:9.2"]);
    }

    #[test]
    fn test_runtime_visibility_follows_runtime_edges() {
        let resolver = ClasspathResolver::new(sample_graph());
        let runtime = resolver.resolve_runtime_visibility(&key("main")).unwrap();

        assert_eq!(runtime.layers, vec![key("launch"), key("mixins"), key("applaunch")]);
        assert!(runtime
            .libraries
            .iter()
            .any(|c| c.module == "mixin"));
        assert!(!runtime.contains_layer(&key("main")));
    }

    #[test]
    fn test_start_layer_excluded_from_own_visibility() {
        let resolver = ClasspathResolver::new(sample_graph());
        let classpath = resolver.resolve_runtime_visibility(&key("mixins")).unwrap();
        assert!(!classpath.contains_layer(&key("mixins")));
        assert!(classpath.contains_layer(&key("main")));
    }

    #[test]
    fn test_unknown_layer() {
        let resolver = ClasspathResolver::new(sample_graph());
        assert!(matches!(
            resolver.resolve_compile_visibility(&key("nope")),
            Err(BuildError::UnknownLayer { .. })
        ));
    }

    #[test]
    fn test_runtime_file_names() {
        let resolver = ClasspathResolver::with_parallelism(sample_graph(), false);
        assert_eq!(
            resolver.runtime_file_names(&key("launch")).unwrap(),
            "guava-21.0.jar"
        );
    }

    #[test]
    fn test_classifier_artifacts_stay_on_classpath() {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let main = graph.define_layer("main", "common").unwrap();
        let game = graph
            .define_library_set(
                "game",
                "common",
                vec![
                    coordinate("org.lwjgl:lwjgl:3.3.1"),
                    coordinate("org.lwjgl:lwjgl:3.3.1:natives-linux"),
                ],
            )
            .unwrap();
        graph.add_library_edge(main, game, Visibility::Compile).unwrap();

        let resolver = ClasspathResolver::new(graph);
        let compile = resolver.resolve_compile_visibility(&key("main")).unwrap();
        assert_eq!(compile.libraries.len(), 2);
        assert_eq!(
            resolver.runtime_file_names(&key("main")).unwrap(),
            "lwjgl-3.3.1.jar;lwjgl-3.3.1-natives-linux.jar"
        );
    }

    #[test]
    fn test_compile_version_follows_runtime_choice() {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let main = graph.define_layer("main", "common").unwrap();
        let api = graph
            .define_library_set("api", "common", vec![coordinate("org.example:foo:1.0")])
            .unwrap();
        let launcher = graph
            .define_library_set("launcher", "common", vec![coordinate("org.example:foo:2.0")])
            .unwrap();
        graph.add_library_edge(main, api, Visibility::Compile).unwrap();
        graph.add_library_edge(main, launcher, Visibility::Runtime).unwrap();

        let resolver = ClasspathResolver::with_parallelism(graph, false);
        let compile = resolver.resolve_compile_visibility(&key("main")).unwrap();
        let runtime = resolver.resolve_runtime_visibility(&key("main")).unwrap();

        let foo = Coordinate::parse("org.example:foo:2.0").unwrap();
        assert_eq!(compile.libraries, vec![foo.clone()]);
        assert_eq!(runtime.libraries, vec![foo]);
    }

    #[test]
    fn test_resolver_freezes_graph() {
        let resolver = ClasspathResolver::new(sample_graph());
        let mut graph = resolver.into_graph();
        assert!(graph.is_frozen());
        assert!(matches!(
            graph.define_layer("late", "common"),
            Err(BuildError::GraphFrozen { .. })
        ));
    }
}
