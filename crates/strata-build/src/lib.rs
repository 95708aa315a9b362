//! Strata build system
//!
//! Turns a declared project into classpaths and archives:
//! - Layer graph with compile and runtime edges across project variants
//! - Library set flattening (inheritance, derivations, exclusions, forced versions)
//! - Eager, parallel classpath resolution per layer
//! - Bundle planning: layer outputs, shaded libraries, service file merging,
//!   inlined and nested bundles, dependency indexes
//! - Deterministic archive writing in bundle dependency order

pub mod archive;
pub mod assembler;
pub mod builder;
pub mod bundle;
pub mod declare;
pub mod error;
pub mod graph;
pub mod index;
pub mod jar_manifest;
pub mod library;
pub mod locator;
pub mod path_filter;
pub mod resolver;
pub mod settings;

// Re-export main types
pub use archive::{ArchiveWriter, WrittenArchive};
pub use assembler::{Assembler, BundleLayout, EntrySource, PlannedEntry};
pub use builder::{BuildContext, BuildStats, Builder, BuiltBundle, CheckReport};
pub use bundle::{ArtifactBundle, BundleId, BundleKind, BundleLayer, BundleSet, NestedBundle, RenameRule};
pub use declare::{lower, Project};
pub use error::{BuildError, BuildResult};
pub use graph::{
    LayerGraph, LayerHandle, LayerNode, LibraryMember, LibrarySetHandle, QualifiedName,
    VariantId, Visibility,
};
pub use index::{DependencyIndex, IndexedArtifact};
pub use jar_manifest::JarManifest;
pub use library::{compare_versions, ResolutionRules};
pub use locator::{ArtifactLocator, MavenRepository};
pub use resolver::{Classpath, ClasspathResolver};
pub use settings::BuildSettings;

// Re-export manifest types for convenience
pub use strata_manifest::{Coordinate, LoadedManifest, ManifestLoader, ProjectManifest};
