//! Destination path exclusion globs
use crate::error::{BuildError, BuildResult};
use regex::Regex;

/// Signature and index metadata that must not survive shading
pub const SHADED_METADATA_EXCLUDES: &[&str] = &[
    "META-INF/MANIFEST.MF",
    "META-INF/INDEX.LIST",
    "META-INF/*.SF",
    "META-INF/*.DSA",
    "META-INF/*.RSA",
    "**/module-info.class",
];

/// Set of compiled globs matched against `/`-separated archive paths.
///
/// `*` matches within one segment, `**/` matches any number of leading
/// directories (including none), `?` matches one character.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<(String, Regex)>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, glob: &str) -> BuildResult<()> {
        let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| {
            BuildError::InvalidDeclaration(format!("invalid path pattern '{}': {}", glob, e))
        })?;
        self.patterns.push((glob.to_string(), regex));
        Ok(())
    }

    pub fn with_globs<'a>(mut self, globs: impl IntoIterator<Item = &'a str>) -> BuildResult<Self> {
        for glob in globs {
            self.add(glob)?;
        }
        Ok(self)
    }

    /// The glob that excludes `path`, if any
    pub fn matching(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(path))
            .map(|(glob, _)| glob.as_str())
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.matching(path).is_some()
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex.push('$');
    regex
}
