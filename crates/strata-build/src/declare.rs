//! Lowering a project manifest into a layer graph and bundle set
use crate::bundle::{
    ArtifactBundle, BundleId, BundleLayer, BundleSet, DependencyIndexSpec, NestedBundle, RenameRule,
};
use crate::error::{BuildError, BuildResult};
use crate::graph::{LayerGraph, LibraryMember, LibrarySetHandle, QualifiedName, Visibility};
use crate::jar_manifest::JarManifest;
use crate::library::ResolutionRules;
use crate::settings::BuildSettings;
use indexmap::IndexMap;
use strata_manifest::{BundleDecl, ProjectManifest, VariantDecl};
use tracing::debug;

/// Declarations ready for resolution
#[derive(Debug, Clone)]
pub struct Project {
    pub graph: LayerGraph,
    pub bundles: BundleSet,
}

/// Build the graph and bundles declared by `manifest`.
///
/// Variants are defined parents first, then every layer and library set, so
/// references may point forward in the file. Edges are added last, in
/// declaration order; the first invalid one aborts lowering.
pub fn lower(manifest: &ProjectManifest, settings: &BuildSettings) -> BuildResult<Project> {
    let mut graph = LayerGraph::new();
    define_variants(&mut graph, manifest)?;

    for (variant, decl) in &manifest.variants {
        for (name, layer) in &decl.layers {
            let handle = graph.define_layer(name, variant)?;
            if let Some(output) = &layer.output {
                graph.set_layer_output(handle, output.clone())?;
            }
        }
        for (name, set) in &decl.libraries {
            let members = set
                .artifacts
                .iter()
                .map(|a| LibraryMember::new(a.coordinate().clone()).with_exclusions(a.exclusions().to_vec()))
                .collect();
            graph.define_library_set(name, variant, members)?;
        }
    }

    graph.set_resolution_rules(ResolutionRules::new(
        manifest.resolution.force.clone(),
        manifest.resolution.exclude.clone(),
    ))?;

    for (variant, decl) in &manifest.variants {
        lower_library_sets(&mut graph, variant, decl)?;
    }
    for (variant, decl) in &manifest.variants {
        lower_layer_edges(&mut graph, variant, decl)?;
    }

    let bundles = lower_bundles(&graph, manifest, settings)?;
    bundles.build_groups()?;

    debug!(
        "Lowered {} variants, {} layers, {} bundles",
        graph.variants().len(),
        graph.layer_count(),
        bundles.len()
    );
    Ok(Project { graph, bundles })
}

fn define_variants(graph: &mut LayerGraph, manifest: &ProjectManifest) -> BuildResult<()> {
    let mut pending: Vec<(&String, &VariantDecl)> = manifest.variants.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        for (name, decl) in pending {
            let ready = decl
                .parent
                .as_deref()
                .map_or(true, |p| graph.variant_id(p).is_some());
            if ready {
                graph.define_variant(name, decl.parent.as_deref())?;
            } else {
                deferred.push((name, decl));
            }
        }

        if deferred.len() == before {
            let (name, decl) = deferred[0];
            let parent = decl.parent.as_deref().unwrap_or_default();
            return Err(if manifest.variants.contains_key(parent) {
                let names: Vec<String> = deferred.iter().map(|(n, _)| n.to_string()).collect();
                BuildError::cycle("variant", &names)
            } else {
                BuildError::unknown_reference("variant", parent, format!("variant '{}'", name))
            });
        }
        pending = deferred;
    }

    Ok(())
}

fn lower_library_sets(graph: &mut LayerGraph, variant: &str, decl: &VariantDecl) -> BuildResult<()> {
    for (name, set) in &decl.libraries {
        let referrer = format!("library set '{}:{}'", variant, name);
        let handle = graph.lookup_library_set(variant, name, &referrer)?;

        for parent in &set.extends {
            let parent = graph.lookup_library_set(variant, parent, &referrer)?;
            graph.add_library_extends(handle, parent)?;
        }
        if let Some(derive) = &set.derive {
            let from = graph.lookup_library_set(variant, &derive.from, &referrer)?;
            let provided = lookup_sets(graph, variant, &derive.provided, &referrer)?;
            graph.set_library_derivation(handle, from, provided)?;
        }
        if !set.exclude.is_empty() {
            graph.set_library_exclusions(handle, set.exclude.clone())?;
        }
    }
    Ok(())
}

fn lower_layer_edges(graph: &mut LayerGraph, variant: &str, decl: &VariantDecl) -> BuildResult<()> {
    for (name, layer) in &decl.layers {
        let referrer = format!("layer '{}:{}'", variant, name);
        let handle = graph.lookup_layer(variant, name, &referrer)?;

        let outputs = [
            (&layer.outputs, Visibility::Compile),
            (&layer.runtime_outputs, Visibility::Runtime),
        ];
        for (references, visibility) in outputs {
            for reference in references {
                let target = graph.lookup_layer(variant, reference, &referrer)?;
                graph.add_output_edge(handle, target, visibility)?;
            }
        }

        let libraries = [
            (&layer.libraries, Visibility::Compile),
            (&layer.runtime_libraries, Visibility::Runtime),
        ];
        for (references, visibility) in libraries {
            for reference in references {
                let target = graph.lookup_library_set(variant, reference, &referrer)?;
                graph.add_library_edge(handle, target, visibility)?;
            }
        }
    }
    Ok(())
}

fn lookup_sets(
    graph: &LayerGraph,
    variant: &str,
    references: &[String],
    referrer: &str,
) -> BuildResult<Vec<LibrarySetHandle>> {
    references
        .iter()
        .map(|r| graph.lookup_library_set(variant, r, referrer))
        .collect()
}

/// Library sets referenced by a bundle, checked for variant visibility
fn bundle_sets(
    graph: &LayerGraph,
    bundle: &QualifiedName,
    references: &[String],
    referrer: &str,
) -> BuildResult<Vec<LibrarySetHandle>> {
    let sets = lookup_sets(graph, &bundle.variant, references, referrer)?;
    for &set in &sets {
        let node = graph.library_set(set);
        check_bundle_reference(graph, bundle, &node.key)?;
    }
    Ok(sets)
}

fn check_bundle_reference(
    graph: &LayerGraph,
    bundle: &QualifiedName,
    target: &QualifiedName,
) -> BuildResult<()> {
    let from = graph
        .variant_id(&bundle.variant)
        .ok_or_else(|| BuildError::unknown_reference("variant", &bundle.variant, bundle.to_string()))?;
    let to = graph
        .variant_id(&target.variant)
        .ok_or_else(|| BuildError::unknown_reference("variant", &target.variant, bundle.to_string()))?;
    graph.check_cross_variant(from, to, bundle, target)
}

fn lower_bundles(
    graph: &LayerGraph,
    manifest: &ProjectManifest,
    settings: &BuildSettings,
) -> BuildResult<BundleSet> {
    let mut bundles = BundleSet::new();
    let mut declared: Vec<(BundleId, &BundleDecl)> = Vec::new();

    for (variant, decl) in &manifest.variants {
        let archive_name = decl
            .archive_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", settings.project_name, variant));

        for (name, bundle_decl) in &decl.bundles {
            let key = QualifiedName::new(variant, name);
            let file_name = bundle_decl.file_name.clone().unwrap_or_else(|| {
                settings.archive_file_name(&archive_name, bundle_decl.classifier.as_deref())
            });

            let mut manifest_attrs = JarManifest::new()
                .with_attributes(&settings.base_manifest)
                .with_attributes(&decl.manifest)
                .with_attributes(&bundle_decl.manifest);
            for (section, attributes) in &bundle_decl.manifest_sections {
                manifest_attrs.set_section(section, attributes.clone());
            }

            let id = bundles.insert(
                ArtifactBundle::new(key, file_name).with_manifest(manifest_attrs),
            )?;
            declared.push((id, bundle_decl));
        }
    }

    for (id, decl) in declared {
        let key = bundles.get(id).name.clone();
        let referrer = format!("bundle '{}'", key);
        let lowered = lower_bundle_references(graph, &bundles, &key, decl, &referrer)?;

        let bundle = bundles.get_mut(id);
        bundle.layers = lowered.layers;
        bundle.shade = lowered.shade;
        bundle.exclude_libraries = lowered.exclude_libraries;
        bundle.exclude_paths = decl.exclude_paths.clone();
        bundle.merge_service_files = decl.merge_service_files.unwrap_or(true);
        bundle.manifest_from = lowered.manifest_from;
        bundle.rename = lowered.rename;
        bundle.inline = lowered.inline;
        bundle.nest = lowered.nest;
        bundle.dependency_index = lowered.dependency_index;
    }

    Ok(bundles)
}

struct LoweredReferences {
    layers: Vec<BundleLayer>,
    shade: Vec<LibrarySetHandle>,
    exclude_libraries: Vec<LibrarySetHandle>,
    manifest_from: Option<BundleId>,
    rename: Vec<RenameRule>,
    inline: Vec<BundleId>,
    nest: Vec<NestedBundle>,
    dependency_index: Option<DependencyIndexSpec>,
}

fn lower_bundle_references(
    graph: &LayerGraph,
    bundles: &BundleSet,
    key: &QualifiedName,
    decl: &BundleDecl,
    referrer: &str,
) -> BuildResult<LoweredReferences> {
    let variant = key.variant.as_str();

    let mut layers = Vec::with_capacity(decl.layers.len());
    for source in &decl.layers {
        let layer = graph.lookup_layer(variant, source.layer(), referrer)?;
        check_bundle_reference(graph, key, &graph.layer(layer).key)?;
        layers.push(BundleLayer {
            layer,
            prefix: source.prefix().map(str::to_string),
        });
    }

    let lookup_bundle = |reference: &str| -> BuildResult<BundleId> {
        let id = bundles.lookup(variant, reference, referrer)?;
        check_bundle_reference(graph, key, &bundles.get(id).name)?;
        Ok(id)
    };

    let manifest_from = decl.manifest_from.as_deref().map(lookup_bundle).transpose()?;
    let inline = decl
        .inline
        .iter()
        .map(|r| lookup_bundle(r))
        .collect::<BuildResult<Vec<_>>>()?;
    let nest = decl
        .nest
        .iter()
        .map(|n| {
            Ok(NestedBundle {
                bundle: lookup_bundle(&n.bundle)?,
                into: n.into.clone(),
            })
        })
        .collect::<BuildResult<Vec<_>>>()?;

    let rename = decl
        .rename
        .iter()
        .map(|r| RenameRule::new(&r.pattern, r.replacement.clone()))
        .collect::<BuildResult<Vec<_>>>()?;

    let dependency_index = match &decl.dependency_index {
        Some(index) => {
            let mut sections = IndexMap::new();
            for (section, references) in &index.sections {
                sections.insert(section.clone(), bundle_sets(graph, key, references, referrer)?);
            }
            Some(DependencyIndexSpec {
                path: index.path.clone(),
                sections,
                exclude: bundle_sets(graph, key, &index.exclude, referrer)?,
            })
        }
        None => None,
    };

    Ok(LoweredReferences {
        layers,
        shade: bundle_sets(graph, key, &decl.shade, referrer)?,
        exclude_libraries: bundle_sets(graph, key, &decl.exclude_libraries, referrer)?,
        manifest_from,
        rename,
        inline,
        nest,
        dependency_index,
    })
}
