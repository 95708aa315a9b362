//! Dependency index: a JSON resource listing library artifacts per section
use crate::bundle::DependencyIndexSpec;
use crate::error::{BuildError, BuildResult};
use crate::graph::LibraryMember;
use crate::library::{compare_versions, module_ids};
use crate::locator::ArtifactLocator;
use crate::resolver::ClasspathResolver;
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::path::Path;
use strata_manifest::ArtifactId;

const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyIndex {
    pub version: u32,
    pub sections: IndexMap<String, Vec<IndexedArtifact>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedArtifact {
    pub group: String,
    pub module: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// Path relative to a Maven-layout repository
    pub path: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
}

impl DependencyIndex {
    /// Collect every section of `spec`; artifacts are hashed from the repository
    pub fn collect(
        spec: &DependencyIndexSpec,
        resolver: &ClasspathResolver,
        locator: &dyn ArtifactLocator,
    ) -> BuildResult<Self> {
        let graph = resolver.graph();
        let excluded = module_ids(graph, &spec.exclude);
        let mut sections = IndexMap::new();

        for (section, sets) in &spec.sections {
            let mut members: IndexMap<ArtifactId, &LibraryMember> = IndexMap::new();
            for &set in sets {
                for member in resolver.library_members(set) {
                    let id = member.coordinate.artifact_id();
                    if excluded.contains(&id.module) {
                        continue;
                    }
                    match members.get_mut(&id) {
                        Some(existing) => {
                            let newer = compare_versions(
                                &member.coordinate.version,
                                &existing.coordinate.version,
                            ) == Ordering::Greater;
                            if newer {
                                *existing = member;
                            }
                        }
                        None => {
                            members.insert(id, member);
                        }
                    }
                }
            }

            let artifacts = members
                .values()
                .map(|member| Self::index_artifact(member, locator))
                .collect::<BuildResult<Vec<_>>>()?;
            sections.insert(section.clone(), artifacts);
        }

        Ok(Self {
            version: INDEX_FORMAT_VERSION,
            sections,
        })
    }

    /// Pretty-printed JSON with a trailing newline
    pub fn to_json(&self) -> BuildResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self).map_err(|e| {
            BuildError::InvalidDeclaration(format!("dependency index serialization failed: {}", e))
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn index_artifact(
        member: &LibraryMember,
        locator: &dyn ArtifactLocator,
    ) -> BuildResult<IndexedArtifact> {
        let coordinate = &member.coordinate;
        let file = locator.locate(coordinate)?;
        let sha256 = sha256_file(&file).map_err(|e| BuildError::io(&file, e))?;
        let path = coordinate
            .repository_path()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(IndexedArtifact {
            group: coordinate.group.clone(),
            module: coordinate.module.clone(),
            version: coordinate.version.clone(),
            classifier: coordinate.classifier.clone(),
            path,
            sha256,
            exclusions: member.exclusions.iter().map(ToString::to_string).collect(),
        })
    }
}

/// Hex-encoded SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LayerGraph;
    use crate::locator::MavenRepository;
    use pretty_assertions::assert_eq;
    use strata_manifest::{Coordinate, ExclusionRule};
    use tempfile::TempDir;

    fn install(repo: &Path, coord: &str, content: &[u8]) -> Coordinate {
        let coordinate = Coordinate::parse(coord).unwrap();
        let path = repo.join(coordinate.repository_path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        coordinate
    }

    #[test]
    fn test_sections_minus_excluded_sets() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path();
        let guava = install(repo, "com.google.guava:guava:21.0", b"guava");
        let jopt = install(repo, "net.sf.jopt-simple:jopt-simple:5.0.4", b"jopt");
        let api = install(repo, "org.spongepowered:spongeapi:8.0.0", b"api");
        let lwjgl = install(repo, "org.lwjgl:lwjgl:3.3.1", b"lwjgl");
        let natives = install(repo, "org.lwjgl:lwjgl:3.3.1:natives-linux", b"natives");

        let mut graph = LayerGraph::new();
        graph.define_variant("vanilla", None).unwrap();
        let installer = graph
            .define_library_set(
                "installer",
                "vanilla",
                vec![
                    LibraryMember::new(guava.clone()),
                    LibraryMember::new(jopt.clone()).with_exclusions(vec![
                        ExclusionRule::parse("org.checkerframework").unwrap(),
                    ]),
                ],
            )
            .unwrap();
        let game = graph
            .define_library_set(
                "game",
                "vanilla",
                vec![LibraryMember::new(guava), LibraryMember::new(api)],
            )
            .unwrap();
        let platform = graph
            .define_library_set(
                "platform",
                "vanilla",
                vec![LibraryMember::new(lwjgl), LibraryMember::new(natives)],
            )
            .unwrap();
        let shaded = graph
            .define_library_set(
                "gameShaded",
                "vanilla",
                vec![LibraryMember::new(
                    Coordinate::parse("org.spongepowered:spongeapi:8.0.0").unwrap(),
                )],
            )
            .unwrap();
        let resolver = ClasspathResolver::new(graph);

        let spec = DependencyIndexSpec {
            path: "libraries.json".to_string(),
            sections: IndexMap::from([
                ("main".to_string(), vec![game]),
                ("installer".to_string(), vec![installer]),
                ("platform".to_string(), vec![platform]),
            ]),
            exclude: vec![shaded],
        };
        let index =
            DependencyIndex::collect(&spec, &resolver, &MavenRepository::new(repo)).unwrap();

        let main: Vec<&str> = index.sections["main"].iter().map(|a| a.module.as_str()).collect();
        assert_eq!(main, vec!["guava"]);
        let installer = &index.sections["installer"];
        assert_eq!(installer.len(), 2);
        assert_eq!(
            installer[1].path,
            "net/sf/jopt-simple/jopt-simple/5.0.4/jopt-simple-5.0.4.jar"
        );
        assert_eq!(installer[1].exclusions, vec!["org.checkerframework"]);
        assert_eq!(
            installer[0].sha256,
            sha256_file(&repo.join("com/google/guava/guava/21.0/guava-21.0.jar")).unwrap()
        );

        let platform: Vec<Option<&str>> = index.sections["platform"]
            .iter()
            .map(|a| a.classifier.as_deref())
            .collect();
        assert_eq!(platform, vec![None, Some("natives-linux")]);
        assert_eq!(
            index.sections["platform"][1].path,
            "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"
        );

        let json = String::from_utf8(index.to_json().unwrap()).unwrap();
        assert!(json.starts_with("{\n  \"version\": 1,"));
        assert_eq!(json.matches("\"classifier\"").count(), 1);
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn test_missing_artifact_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let set = graph
            .define_library_set(
                "libs",
                "common",
                vec![LibraryMember::new(Coordinate::parse("org.example:absent:1.0").unwrap())],
            )
            .unwrap();
        let resolver = ClasspathResolver::new(graph);
        let spec = DependencyIndexSpec {
            path: "libraries.json".to_string(),
            sections: IndexMap::from([("main".to_string(), vec![set])]),
            exclude: Vec::new(),
        };

        let err = DependencyIndex::collect(&spec, &resolver, &MavenRepository::new(temp_dir.path()))
            .unwrap_err();
        assert!(matches!(err, BuildError::ArtifactNotFound { .. }));
    }
}
