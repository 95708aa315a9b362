//! Deterministic archive writing
//!
//! The manifest is always the first entry, every entry carries the DOS epoch
//! timestamp and fixed permissions, and entries follow the plan order. Given
//! the same inputs the output is byte-identical.
use crate::assembler::{BundleLayout, EntrySource};
use crate::error::{BuildError, BuildResult};
use crate::jar_manifest::MANIFEST_PATH;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const ENTRY_PERMISSIONS: u32 = 0o644;

/// Result of writing one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenArchive {
    pub path: PathBuf,
    /// Entries including the manifest
    pub entries: usize,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    retry_io: bool,
}

impl ArchiveWriter {
    pub fn new(retry_io: bool) -> Self {
        Self { retry_io }
    }

    /// Write `layout` to `destination`, retrying once on I/O failure
    pub fn write(&self, layout: &BundleLayout, destination: &Path) -> BuildResult<WrittenArchive> {
        match self.write_once(layout, destination) {
            Err(e) if self.retry_io && matches!(e, BuildError::IoError { .. } | BuildError::Archive { .. }) => {
                warn!("Writing {} failed ({}); retrying once", destination.display(), e);
                self.write_once(layout, destination)
            }
            result => result,
        }
    }

    fn write_once(&self, layout: &BundleLayout, destination: &Path) -> BuildResult<WrittenArchive> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| layout.file_name.clone());
        let staging = destination.with_file_name(format!(".{}.tmp", file_name));

        let entries = match write_entries(layout, &staging) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e);
            }
        };
        fs::rename(&staging, destination).map_err(|e| BuildError::io(destination, e))?;

        let size = fs::metadata(destination)
            .map_err(|e| BuildError::io(destination, e))?
            .len();
        info!(
            "Wrote {} ({} entries, {} bytes)",
            destination.display(),
            entries,
            size
        );

        Ok(WrittenArchive {
            path: destination.to_path_buf(),
            entries,
            size,
        })
    }
}

fn entry_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_PERMISSIONS)
}

fn write_entries(layout: &BundleLayout, path: &Path) -> BuildResult<usize> {
    let file = File::create(path).map_err(|e| BuildError::io(path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = entry_options();
    let mut sources = SourceArchives::default();

    zip.start_file(MANIFEST_PATH, options)
        .map_err(|e| BuildError::archive(path, e))?;
    zip.write_all(&layout.manifest.render())
        .map_err(|e| BuildError::io(path, e))?;

    for entry in &layout.entries {
        zip.start_file(entry.destination.as_str(), options)
            .map_err(|e| BuildError::archive(path, e))?;

        match &entry.source {
            EntrySource::File(source) => {
                let mut input = File::open(source).map_err(|e| BuildError::io(source, e))?;
                io::copy(&mut input, &mut zip).map_err(|e| BuildError::io(source, e))?;
            }
            EntrySource::ArchiveEntry { archive, name } => {
                let source = sources.open(archive)?;
                let mut input = source
                    .by_name(name)
                    .map_err(|e| BuildError::archive(archive, e))?;
                io::copy(&mut input, &mut zip).map_err(|e| BuildError::io(archive, e))?;
            }
            EntrySource::Generated(bytes) => {
                zip.write_all(bytes).map_err(|e| BuildError::io(path, e))?;
            }
        }
    }

    let mut writer = zip.finish().map_err(|e| BuildError::archive(path, e))?;
    writer.flush().map_err(|e| BuildError::io(path, e))?;

    Ok(layout.entries.len() + 1)
}

/// Source archives opened at most once per write
#[derive(Default)]
struct SourceArchives {
    open: HashMap<PathBuf, ZipArchive<BufReader<File>>>,
}

impl SourceArchives {
    fn open(&mut self, path: &Path) -> BuildResult<&mut ZipArchive<BufReader<File>>> {
        if !self.open.contains_key(path) {
            let file = File::open(path).map_err(|e| BuildError::io(path, e))?;
            let archive =
                ZipArchive::new(BufReader::new(file)).map_err(|e| BuildError::archive(path, e))?;
            self.open.insert(path.to_path_buf(), archive);
        }
        self.open
            .get_mut(path)
            .ok_or_else(|| BuildError::io(path, io::Error::from(io::ErrorKind::NotFound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::PlannedEntry;
    use crate::graph::QualifiedName;
    use crate::jar_manifest::JarManifest;
    use std::io::Read;
    use tempfile::TempDir;

    fn layout(dir: &Path) -> BundleLayout {
        let class_file = dir.join("Main.class");
        fs::write(&class_file, b"\xCA\xFE\xBA\xBE").unwrap();
        BundleLayout {
            bundle: QualifiedName::new("common", "jar"),
            file_name: "sponge-1.0.jar".to_string(),
            manifest: JarManifest::new(),
            entries: vec![
                PlannedEntry {
                    destination: "org/spongepowered/Main.class".to_string(),
                    source: EntrySource::File(class_file),
                    origin: "layer common:main".to_string(),
                },
                PlannedEntry {
                    destination: "META-INF/services/a.B".to_string(),
                    source: EntrySource::Generated(b"x.Y\n".to_vec()),
                    origin: "generated".to_string(),
                },
            ],
            shaded: Vec::new(),
        }
    }

    #[test]
    fn test_manifest_first_and_fixed_timestamps() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("libs/sponge-1.0.jar");
        let written = ArchiveWriter::new(true)
            .write(&layout(temp_dir.path()), &out)
            .unwrap();
        assert_eq!(written.entries, 3);

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "META-INF/MANIFEST.MF",
                "org/spongepowered/Main.class",
                "META-INF/services/a.B"
            ]
        );

        let mut service = archive.by_name("META-INF/services/a.B").unwrap();
        let mut content = String::new();
        service.read_to_string(&mut content).unwrap();
        assert_eq!(content, "x.Y\n");
        assert_eq!(service.last_modified().year(), 1980);
    }

    #[test]
    fn test_rewrites_are_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(temp_dir.path());
        let first = temp_dir.path().join("a.jar");
        let second = temp_dir.path().join("b.jar");
        let writer = ArchiveWriter::new(false);
        writer.write(&layout, &first).unwrap();
        writer.write(&layout, &second).unwrap();

        assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn test_missing_source_fails_without_leaving_output() {
        let temp_dir = TempDir::new().unwrap();
        let mut layout = layout(temp_dir.path());
        layout.entries[0].source = EntrySource::File(temp_dir.path().join("Gone.class"));
        let out = temp_dir.path().join("broken.jar");

        let err = ArchiveWriter::new(true).write(&layout, &out).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!out.exists());
        assert!(!temp_dir.path().join(".broken.jar.tmp").exists());
    }
}
