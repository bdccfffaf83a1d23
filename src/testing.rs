//! Test support: archives written to throwaway directories.
//!
//! ```
//! use dwca_stream::testing::{ArchiveFixture, occurrence_core};
//!
//! # fn main() -> anyhow::Result<()> {
//! let fixture = ArchiveFixture::new()?
//!     .core(occurrence_core("occurrence.txt", &["id", "scientificName"]), "1,Puma concolor\n")
//!     .write()?;
//! let archive = fixture.open()?;
//! assert_eq!(archive.core()?.fields().len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::descriptor::{
    ArchiveDescriptor, FieldDescriptor, SourceDescriptor, read_archive, vocab, write_metadata,
};
use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Core keyed on column 0 with one indexed field per term.
#[must_use]
pub fn occurrence_core(location: &str, terms: &[&str]) -> SourceDescriptor {
    terms.iter().enumerate().fold(
        SourceDescriptor::core(vocab::OCCURRENCE, location).with_id(0),
        |s, (i, t)| s.with_field(FieldDescriptor::indexed(i, *t)),
    )
}

/// Extension keyed on column 0 with one indexed field per term.
#[must_use]
pub fn multimedia_extension(location: &str, terms: &[&str]) -> SourceDescriptor {
    terms.iter().enumerate().fold(
        SourceDescriptor::extension(vocab::MULTIMEDIA, location, 0),
        |s, (i, t)| s.with_field(FieldDescriptor::indexed(i, *t)),
    )
}

/// Builds an archive on disk: a `meta.xml` plus data files in a temp directory
/// that is removed when the fixture is dropped.
pub struct ArchiveFixture {
    dir: TempDir,
    core: Option<SourceDescriptor>,
    extensions: Vec<SourceDescriptor>,
    files: Vec<(String, Vec<u8>)>,
    raw_meta: Option<String>,
}

impl ArchiveFixture {
    /// # Errors
    /// If the temp directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create fixture dir")?,
            core: None,
            extensions: Vec::new(),
            files: Vec::new(),
            raw_meta: None,
        })
    }

    /// Core descriptor plus the contents of its first location.
    #[must_use]
    pub fn core(mut self, source: SourceDescriptor, contents: impl Into<Vec<u8>>) -> Self {
        if let Some(loc) = source.primary_location() {
            self.files.push((loc.to_string(), contents.into()));
        }
        self.core = Some(source);
        self
    }

    #[must_use]
    pub fn extension(mut self, source: SourceDescriptor, contents: impl Into<Vec<u8>>) -> Self {
        if let Some(loc) = source.primary_location() {
            self.files.push((loc.to_string(), contents.into()));
        }
        self.extensions.push(source);
        self
    }

    /// Any extra file, relative to the archive root.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.push((name.into(), contents.into()));
        self
    }

    /// Use `xml` verbatim as `meta.xml` instead of generating it.
    #[must_use]
    pub fn raw_metadata(mut self, xml: impl Into<String>) -> Self {
        self.raw_meta = Some(xml.into());
        self
    }

    /// Write everything to disk.
    ///
    /// # Errors
    /// If a file cannot be written or there is neither a core nor raw metadata.
    pub fn write(self) -> Result<Self> {
        for (name, contents) in &self.files {
            let path = self.dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        let meta = self.dir.path().join("meta.xml");
        match (&self.raw_meta, &self.core) {
            (Some(xml), _) => {
                fs::write(&meta, xml).with_context(|| format!("write {}", meta.display()))?;
            }
            (None, Some(core)) => {
                let archive =
                    ArchiveDescriptor::with_sources(core.clone(), self.extensions.iter().cloned())?;
                let f = File::create(&meta).with_context(|| format!("create {}", meta.display()))?;
                write_metadata(&archive, f, false)?;
            }
            (None, None) => bail!("fixture has neither a core nor raw metadata"),
        }
        Ok(self)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Parse the written archive back from disk.
    ///
    /// # Errors
    /// Whatever [`read_archive`] reports.
    pub fn open(&self) -> Result<ArchiveDescriptor> {
        read_archive(self.dir.path())
            .with_context(|| format!("read fixture {}", self.dir.path().display()))
    }
}

/// `n` rows of `key,value-key` with keys `0..n`, zero-padded to `width`.
#[must_use]
pub fn numbered_rows(n: usize, width: usize) -> String {
    (0..n).map(|i| format!("{i:0width$},value-{i}\n")).collect()
}
