//! Library set flattening and version selection
use crate::graph::{LayerGraph, LibraryMember, LibrarySetHandle};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashSet;
use strata_manifest::{ArtifactId, Coordinate, ExclusionRule, ModuleId};

/// Project-wide forced versions and exclusions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionRules {
    pub force: Vec<Coordinate>,
    pub exclude: Vec<ExclusionRule>,
}

impl ResolutionRules {
    pub fn new(force: Vec<Coordinate>, exclude: Vec<ExclusionRule>) -> Self {
        Self { force, exclude }
    }

    /// Version a module is pinned to, if any
    pub fn forced_version(&self, id: &ModuleId) -> Option<&str> {
        self.force
            .iter()
            .find(|c| c.group == id.group && c.module == id.module)
            .map(|c| c.version.as_str())
    }

    pub fn is_excluded(&self, id: &ModuleId) -> bool {
        self.exclude.iter().any(|rule| rule.matches(id))
    }
}

/// Full membership of a library set.
///
/// Derived members come first, then inherited members in `extends` order,
/// then the set's own artifacts. Set-level and global exclusions and forced
/// versions are applied, and repeated coordinates keep their first position.
/// Differing versions of one module are all kept; callers decide.
pub fn flatten(graph: &LayerGraph, set: LibrarySetHandle) -> Vec<LibraryMember> {
    let node = graph.library_set(set);

    let mut members: Vec<LibraryMember> = match &node.derivation {
        Some(derivation) => {
            let provided = module_ids(graph, &derivation.provided);
            flatten(graph, derivation.from)
                .into_iter()
                .filter(|m| !provided.contains(&m.coordinate.module_id()))
                .collect()
        }
        None => Vec::new(),
    };
    for &parent in &node.extends {
        members.extend(flatten(graph, parent));
    }
    members.extend(node.members.iter().cloned());

    let rules = graph.resolution();
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter_map(|mut member| {
            let id = member.coordinate.module_id();
            if node.exclusions.iter().any(|rule| rule.matches(&id)) || rules.is_excluded(&id) {
                return None;
            }
            if let Some(version) = rules.forced_version(&id) {
                member.coordinate = member.coordinate.with_version(version);
            }
            Some(member)
        })
        .filter(|member| seen.insert(member.coordinate.clone()))
        .collect()
}

/// Module identities present in any of `sets`
pub fn module_ids(graph: &LayerGraph, sets: &[LibrarySetHandle]) -> HashSet<ModuleId> {
    sets.iter()
        .flat_map(|&set| flatten(graph, set))
        .map(|member| member.coordinate.module_id())
        .collect()
}

/// Ordered coordinate list where one artifact appears once.
///
/// Artifacts are keyed by [`ArtifactId`], so a classifier artifact sits next
/// to the main one. A newer version replaces an older one in place, keeping
/// the position where the artifact was first seen.
#[derive(Debug, Clone, Default)]
pub struct NewestVersionSet {
    entries: IndexMap<ArtifactId, Coordinate>,
}

impl NewestVersionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coordinate: Coordinate) {
        match self.entries.get_mut(&coordinate.artifact_id()) {
            Some(existing) => {
                if compare_versions(&coordinate.version, &existing.version) == Ordering::Greater {
                    *existing = coordinate;
                }
            }
            None => {
                self.entries.insert(coordinate.artifact_id(), coordinate);
            }
        }
    }

    /// Chosen coordinate for an artifact
    pub fn get(&self, id: &ArtifactId) -> Option<&Coordinate> {
        self.entries.get(id)
    }

    pub fn into_vec(self) -> Vec<Coordinate> {
        self.entries.into_values().collect()
    }
}

fn parse_numeric_version_parts(raw: &str) -> Vec<u32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse::<u32>().ok())
        .collect()
}

/// Compare versions by numeric segments, falling back to text order
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts = parse_numeric_version_parts(a);
    let b_parts = parse_numeric_version_parts(b);

    let max_len = a_parts.len().max(b_parts.len());
    for idx in 0..max_len {
        let a_val = a_parts.get(idx).copied().unwrap_or(0);
        let b_val = b_parts.get(idx).copied().unwrap_or(0);
        match a_val.cmp(&b_val) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }

    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn member(coord: &str) -> LibraryMember {
        LibraryMember::new(Coordinate::parse(coord).unwrap())
    }

    fn coords(members: &[LibraryMember]) -> Vec<String> {
        members.iter().map(|m| m.coordinate.to_string()).collect()
    }

    #[rstest]
    #[case("1.0", "2.0", Ordering::Less)]
    #[case("2.8.9", "2.8.0", Ordering::Greater)]
    #[case("1.10", "1.9", Ordering::Greater)]
    #[case("21.0", "21.0", Ordering::Equal)]
    #[case("1.0", "1.0.0", Ordering::Less)]
    fn test_compare_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn test_newest_version_keeps_first_position() {
        let mut set = NewestVersionSet::new();
        set.insert(Coordinate::parse("com.google.guava:guava:17.0").unwrap());
        set.insert(Coordinate::parse("com.google.code.gson:gson:2.8.0").unwrap());
        set.insert(Coordinate::parse("com.google.guava:guava:21.0").unwrap());
        set.insert(Coordinate::parse("com.google.guava:guava:20.0").unwrap());

        let result: Vec<String> = set.into_vec().iter().map(ToString::to_string).collect();
        assert_eq!(
            result,
            vec!["com.google.guava:guava:21.0", "com.google.code.gson:gson:2.8.0"]
        );
    }

    #[test]
    fn test_newest_version_keeps_classifier_artifacts() {
        let mut set = NewestVersionSet::new();
        set.insert(Coordinate::parse("org.lwjgl:lwjgl:3.2.2").unwrap());
        set.insert(Coordinate::parse("org.lwjgl:lwjgl:3.2.2:natives-linux").unwrap());
        set.insert(Coordinate::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap());

        let natives = Coordinate::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap();
        assert_eq!(set.get(&natives.artifact_id()), Some(&natives));

        let result: Vec<String> = set.into_vec().iter().map(ToString::to_string).collect();
        assert_eq!(
            result,
            vec!["org.lwjgl:lwjgl:3.2.2", "org.lwjgl:lwjgl:3.3.1:natives-linux"]
        );
    }

    #[test]
    fn test_flatten_extends_and_exclusions() {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let base = graph
            .define_library_set(
                "base",
                "common",
                vec![
                    member("com.google.guava:guava:21.0"),
                    member("org.checkerframework:checker-qual:3.4.0"),
                ],
            )
            .unwrap();
        let launch = graph
            .define_library_set("launch", "common", vec![member("org.ow2.asm:asm:9.2")])
            .unwrap();
        graph.add_library_extends(launch, base).unwrap();
        graph
            .set_library_exclusions(launch, vec![ExclusionRule::parse("org.checkerframework").unwrap()])
            .unwrap();

        assert_eq!(
            coords(&flatten(&graph, launch)),
            vec!["com.google.guava:guava:21.0", "org.ow2.asm:asm:9.2"]
        );
        assert_eq!(flatten(&graph, base).len(), 2);
    }

    #[test]
    fn test_flatten_derivation_removes_provided_modules() {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let game = graph
            .define_library_set(
                "game",
                "common",
                vec![
                    member("com.google.guava:guava:21.0"),
                    member("com.mojang:brigadier:1.0.18"),
                ],
            )
            .unwrap();
        let installer = graph
            .define_library_set(
                "installer",
                "common",
                vec![
                    member("com.google.guava:guava:31.0"),
                    member("net.sf.jopt-simple:jopt-simple:5.0.4"),
                ],
            )
            .unwrap();
        let copied = graph.define_library_set("copied", "common", Vec::new()).unwrap();
        graph
            .set_library_derivation(copied, installer, vec![game])
            .unwrap();

        assert_eq!(
            coords(&flatten(&graph, copied)),
            vec!["net.sf.jopt-simple:jopt-simple:5.0.4"]
        );
    }

    #[test]
    fn test_flatten_applies_global_rules() {
        let mut graph = LayerGraph::new();
        graph.define_variant("common", None).unwrap();
        let set = graph
            .define_library_set(
                "libs",
                "common",
                vec![
                    member("com.google.code.gson:gson:2.8.0"),
                    member("com.mojang:minecraft:1.16.5"),
                ],
            )
            .unwrap();
        graph
            .set_resolution_rules(ResolutionRules::new(
                vec![Coordinate::parse("com.google.code.gson:gson:2.8.9").unwrap()],
                vec![ExclusionRule::parse("com.mojang:minecraft").unwrap()],
            ))
            .unwrap();

        assert_eq!(
            coords(&flatten(&graph, set)),
            vec!["com.google.code.gson:gson:2.8.9"]
        );
    }
}
