//! `META-INF/MANIFEST.MF` model and rendering
use indexmap::IndexMap;

/// Archive path the manifest is written to
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

const MANIFEST_VERSION: &str = "Manifest-Version";
const MAX_LINE_BYTES: usize = 72;

/// Main attributes plus named per-entry sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JarManifest {
    pub main: IndexMap<String, String>,
    pub sections: IndexMap<String, IndexMap<String, String>>,
}

impl JarManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, attributes: &IndexMap<String, String>) -> Self {
        self.merge_attributes(attributes);
        self
    }

    /// Set attributes; an existing attribute keeps its position
    pub fn merge_attributes(&mut self, attributes: &IndexMap<String, String>) {
        for (name, value) in attributes {
            self.main.insert(name.clone(), value.clone());
        }
    }

    /// Layer `other` underneath: attributes already set here win
    pub fn inherit(&mut self, other: &JarManifest) {
        let mut main = other.main.clone();
        main.extend(self.main.drain(..));
        self.main = main;

        let mut sections = other.sections.clone();
        for (name, attributes) in self.sections.drain(..) {
            sections.entry(name).or_default().extend(attributes);
        }
        self.sections = sections;
    }

    pub fn set_section(&mut self, name: impl Into<String>, attributes: IndexMap<String, String>) {
        self.sections.entry(name.into()).or_default().extend(attributes);
    }

    /// Render with CRLF line endings and 72-byte line wrapping
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        let version = self
            .main
            .get(MANIFEST_VERSION)
            .map(String::as_str)
            .unwrap_or("1.0");
        write_attribute(&mut out, MANIFEST_VERSION, version);
        for (name, value) in self.main.iter().filter(|(n, _)| *n != MANIFEST_VERSION) {
            write_attribute(&mut out, name, value);
        }
        out.push_str("\r\n");

        for (section, attributes) in &self.sections {
            write_attribute(&mut out, "Name", section);
            for (name, value) in attributes {
                write_attribute(&mut out, name, value);
            }
            out.push_str("\r\n");
        }

        out.into_bytes()
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    let line = format!("{}: {}", name, value);
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;

    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.push_str(&rest[..split]);
        out.push_str("\r\n ");
        rest = &rest[split..];
        limit = MAX_LINE_BYTES - 1;
    }
}
