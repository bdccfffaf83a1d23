use super::source::{Role, SourceDescriptor};
use crate::config::PassConfig;
use crate::error::{ArchiveError, Result};
use crate::join::Pass;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// A whole `meta.xml`: one core, any number of extensions, and where the files live.
///
/// Sources are held behind `Arc` so join passes can hand them to worker threads
/// without copying the field lists.
#[derive(Clone, Debug, Default)]
pub struct ArchiveDescriptor {
    core: Option<Arc<SourceDescriptor>>,
    extensions: Vec<Arc<SourceDescriptor>>,
    base_path: Option<PathBuf>,
}

impl ArchiveDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor used by builders and tests.
    ///
    /// # Errors
    /// Same as [`Self::set_core`] and [`Self::add_extension`].
    pub fn with_sources(
        core: SourceDescriptor,
        extensions: impl IntoIterator<Item = SourceDescriptor>,
    ) -> Result<Self> {
        let mut archive = Self::new();
        archive.set_core(core)?;
        for ext in extensions {
            archive.add_extension(ext)?;
        }
        Ok(archive)
    }

    /// # Errors
    /// [`ArchiveError::Structural`] if a core is already set or `core` is not a core.
    pub fn set_core(&mut self, core: SourceDescriptor) -> Result<()> {
        if self.core.is_some() {
            return Err(ArchiveError::structural(
                "multiple core elements found for darwin core archive document",
            ));
        }
        if core.role() != Role::Core {
            return Err(ArchiveError::structural("the core must be typed as core"));
        }
        self.core = Some(Arc::new(core));
        Ok(())
    }

    /// # Errors
    /// [`ArchiveError::Structural`] if `extension` is not typed as an extension.
    pub fn add_extension(&mut self, extension: SourceDescriptor) -> Result<()> {
        if extension.role() != Role::Extension {
            return Err(ArchiveError::structural(
                "all extensions must be typed as extension",
            ));
        }
        self.extensions.push(Arc::new(extension));
        Ok(())
    }

    /// # Errors
    /// [`ArchiveError::Structural`] if the document had no core.
    pub fn core(&self) -> Result<&Arc<SourceDescriptor>> {
        self.core
            .as_ref()
            .ok_or_else(|| ArchiveError::structural("could not find core in this document"))
    }

    #[must_use]
    pub fn extensions(&self) -> &[Arc<SourceDescriptor>] {
        &self.extensions
    }

    #[must_use]
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    pub fn set_base_path(&mut self, base: impl Into<PathBuf>) {
        self.base_path = Some(base.into());
    }

    /// Absolute location of the file `source` reads.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] if no base path has been assigned or the
    /// source has no location.
    pub fn resolve(&self, source: &SourceDescriptor) -> Result<PathBuf> {
        let base = self.base_path.as_deref().ok_or_else(|| {
            ArchiveError::structural(
                "archive has no base path, not able to locate data files",
            )
        })?;
        let location = source.primary_location().ok_or_else(|| {
            ArchiveError::structural(format!("{} must have files set", source.role()))
        })?;
        if source.locations().len() > 1 {
            warn!(
                source = %source.label(),
                ignored = source.locations().len() - 1,
                "only the first file location is read"
            );
        }
        Ok(base.join(location))
    }

    /// Check every document invariant.
    ///
    /// # Errors
    /// [`ArchiveError::Structural`] describing the first violation found.
    pub fn check(&self) -> Result<()> {
        let core = self.core()?;
        core.check()?;
        if !self.extensions.is_empty() && core.id_index().is_none() {
            return Err(ArchiveError::structural(
                "core must have id set if there are extensions present",
            ));
        }
        self.extensions.iter().try_for_each(|e| e.check())
    }

    /// Open a join pass with the default [`PassConfig`].
    ///
    /// # Errors
    /// See [`Pass::open`].
    pub fn pass(&self, include_defaults: bool) -> Result<Pass> {
        Pass::open(self, include_defaults, PassConfig::default())
    }
}
