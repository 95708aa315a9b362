//! Maven-style artifact coordinates and module exclusion rules

use crate::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Identity of a module regardless of version (`group:module`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub group: String,
    pub module: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.module)
    }
}

/// Identity of one artifact regardless of version (`group:module[:classifier]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId {
    pub module: ModuleId,
    pub classifier: Option<String>,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.classifier {
            Some(classifier) => write!(f, "{}:{}", self.module, classifier),
            None => write!(f, "{}", self.module),
        }
    }
}

/// A fully parsed artifact coordinate.
///
/// Supported formats:
///   `group:module:version`
///   `group:module:version:classifier`
///   `group:module:version:classifier@extension`
///   `group:module:version@extension`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    pub group: String,
    pub module: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension, `jar` unless overridden with `@`
    pub extension: String,
}

impl Coordinate {
    /// Parse a coordinate string
    pub fn parse(coord: &str) -> crate::Result<Self> {
        let (coord_part, extension) = match coord.rfind('@') {
            Some(idx) => (&coord[..idx], Some(&coord[idx + 1..])),
            None => (coord, None),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ManifestError::InvalidCoordinate(coord.to_string()));
        }
        if extension.is_some_and(|e| e.is_empty()) {
            return Err(ManifestError::InvalidCoordinate(coord.to_string()));
        }

        Ok(Self {
            group: parts[0].to_string(),
            module: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension: extension.unwrap_or("jar").to_string(),
        })
    }

    /// Version-independent identity
    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(&self.group, &self.module)
    }

    /// Version-independent identity that tells classifier artifacts apart
    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId {
            module: self.module_id(),
            classifier: self.classifier.clone(),
        }
    }

    /// Same coordinate pinned to another version
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        let mut clone = self.clone();
        clone.version = version.into();
        clone
    }

    /// `module-version[-classifier].extension`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.module, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.module, self.version, self.extension),
        }
    }

    /// Path relative to a Maven-layout repository root:
    /// `<group path>/<module>/<version>/<file name>`
    pub fn repository_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.group.split('.') {
            path.push(segment);
        }
        path.join(&self.module)
            .join(&self.version)
            .join(self.file_name())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.module, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Coordinate {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}

/// Module exclusion: a whole group (`group`, `group:*`) or one module (`group:module`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExclusionRule {
    pub group: String,
    pub module: Option<String>,
}

impl ExclusionRule {
    pub fn parse(rule: &str) -> crate::Result<Self> {
        let mut parts = rule.split(':');
        let group = parts.next().unwrap_or_default().trim();
        let module = parts.next().map(str::trim);
        if group.is_empty() || parts.next().is_some() || module.is_some_and(str::is_empty) {
            return Err(ManifestError::InvalidExclusion(rule.to_string()));
        }

        Ok(Self {
            group: group.to_string(),
            module: module.filter(|m| *m != "*").map(str::to_string),
        })
    }

    pub fn module(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: Some(module.into()),
        }
    }

    pub fn matches(&self, id: &ModuleId) -> bool {
        self.group == id.group && self.module.as_ref().map_or(true, |m| *m == id.module)
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{}:{}", self.group, m),
            None => write!(f, "{}", self.group),
        }
    }
}

impl TryFrom<String> for ExclusionRule {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExclusionRule> for String {
    fn from(value: ExclusionRule) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_simple_coordinate() {
        let c = Coordinate::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        assert_eq!(c.group, "net.sf.jopt-simple");
        assert_eq!(c.module, "jopt-simple");
        assert_eq!(c.version, "5.0.4");
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "jar");
    }

    #[test]
    fn parse_classifier_and_extension() {
        let c = Coordinate::parse("org.lwjgl:lwjgl:3.3.1:natives-linux@zip").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("natives-linux"));
        assert_eq!(c.extension, "zip");
        assert_eq!(c.file_name(), "lwjgl-3.3.1-natives-linux.zip");
        assert_eq!(c.to_string(), "org.lwjgl:lwjgl:3.3.1:natives-linux@zip");
    }

    #[rstest]
    #[case("org.example:foo")]
    #[case("org.example::1.0")]
    #[case("a:b:c:d:e")]
    #[case("a:b:1.0@")]
    #[case(" :b:1.0")]
    fn rejects_malformed_coordinates(#[case] coord: &str) {
        assert!(matches!(
            Coordinate::parse(coord),
            Err(ManifestError::InvalidCoordinate(_))
        ));
    }

    #[test]
    fn artifact_id_keeps_classifier() {
        let plain = Coordinate::parse("org.lwjgl:lwjgl:3.3.1").unwrap();
        let natives = Coordinate::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap();
        let newer = Coordinate::parse("org.lwjgl:lwjgl:3.3.2").unwrap();

        assert_eq!(plain.module_id(), natives.module_id());
        assert_ne!(plain.artifact_id(), natives.artifact_id());
        assert_eq!(plain.artifact_id(), newer.artifact_id());
        assert_eq!(natives.artifact_id().to_string(), "org.lwjgl:lwjgl:natives-linux");
    }

    #[test]
    fn repository_path_follows_maven_layout() {
        let c = Coordinate::parse("com.google.code.gson:gson:2.8.0").unwrap();
        assert_eq!(
            c.repository_path(),
            PathBuf::from("com/google/code/gson/gson/2.8.0/gson-2.8.0.jar")
        );
    }

    #[test]
    fn exclusion_matches_group_or_module() {
        let whole_group = ExclusionRule::parse("org.checkerframework").unwrap();
        let star = ExclusionRule::parse("org.checkerframework:*").unwrap();
        let single = ExclusionRule::parse("com.mojang:minecraft").unwrap();

        let qual = ModuleId::new("org.checkerframework", "checker-qual");
        assert!(whole_group.matches(&qual));
        assert!(star.matches(&qual));
        assert!(!single.matches(&qual));
        assert!(single.matches(&ModuleId::new("com.mojang", "minecraft")));
        assert!(!single.matches(&ModuleId::new("com.mojang", "brigadier")));
    }

    #[rstest]
    #[case("")]
    #[case("group:")]
    #[case("a:b:c")]
    fn exclusion_rejects_empty_parts(#[case] rule: &str) {
        assert!(ExclusionRule::parse(rule).is_err());
    }
}
