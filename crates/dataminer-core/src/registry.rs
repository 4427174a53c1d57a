//! # Configuration Registry
//!
//! Maps build identifiers to serialized address configurations.
//!
//! A registry only hands out blobs. Deserialization happens in the resolver,
//! and only for the build that actually matched a running instance.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::DataminerResult;

/// Read-only store of configuration blobs keyed by build identifier
pub trait ConfigurationRegistry
{
    /// Serialized configuration for `build`, or `None` if the build is unknown
    ///
    /// ## Errors
    ///
    /// Backends that read from storage report I/O failures other than "not found".
    fn blob(&self, build: &str) -> DataminerResult<Option<Cow<'_, str>>>;

    /// Whether a configuration exists for `build`
    fn contains(&self, build: &str) -> DataminerResult<bool>
    {
        Ok(self.blob(build)?.is_some())
    }
}

impl<R: ConfigurationRegistry + ?Sized> ConfigurationRegistry for &R
{
    fn blob(&self, build: &str) -> DataminerResult<Option<Cow<'_, str>>>
    {
        (**self).blob(build)
    }

    fn contains(&self, build: &str) -> DataminerResult<bool>
    {
        (**self).contains(build)
    }
}

/// In-memory registry
///
/// ```rust
/// use dataminer_core::registry::{ConfigurationRegistry, MemoryRegistry};
///
/// let registry = MemoryRegistry::new().with("124", r#"{"reference_base": "0x400000"}"#);
/// assert!(registry.contains("124")?);
/// assert!(!registry.contains("125")?);
/// # Ok::<(), dataminer_core::error::DataminerError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry
{
    entries: HashMap<String, String>,
}

impl MemoryRegistry
{
    /// Create an empty registry
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Register a blob under `build`, replacing any previous one
    #[must_use]
    pub fn with(mut self, build: impl Into<String>, blob: impl Into<String>) -> Self
    {
        self.insert(build, blob);
        self
    }

    /// Register a blob under `build`, replacing any previous one
    pub fn insert(&mut self, build: impl Into<String>, blob: impl Into<String>)
    {
        self.entries.insert(build.into(), blob.into());
    }

    /// Number of registered builds
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether no builds are registered
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

impl ConfigurationRegistry for MemoryRegistry
{
    fn blob(&self, build: &str) -> DataminerResult<Option<Cow<'_, str>>>
    {
        Ok(self.entries.get(build).map(|blob| Cow::Borrowed(blob.as_str())))
    }
}

/// Registry backed by a directory of `<build>.json` files
///
/// Files are read on lookup, never up front.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry
{
    root: PathBuf,
}

impl DirectoryRegistry
{
    /// File extension of configuration files
    pub const EXTENSION: &'static str = "json";

    /// Create a registry rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into() }
    }

    /// Directory the registry reads from
    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Path of the file that would hold the configuration for `build`
    ///
    /// Returns `None` for identifiers that aren't a plain file stem, so a
    /// hostile version string can't escape the registry directory.
    pub fn path_for(&self, build: &str) -> Option<PathBuf>
    {
        let plain = !build.is_empty() && build.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        plain.then(|| self.root.join(format!("{build}.{}", Self::EXTENSION)))
    }
}

impl ConfigurationRegistry for DirectoryRegistry
{
    fn blob(&self, build: &str) -> DataminerResult<Option<Cow<'_, str>>>
    {
        let Some(path) = self.path_for(build) else {
            tracing::warn!(build, "Ignoring build identifier that is not a valid file name");
            return Ok(None);
        };

        match fs::read_to_string(&path) {
            Ok(blob) => {
                tracing::debug!(build, path = %path.display(), "Loaded configuration blob");
                Ok(Some(Cow::Owned(blob)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, build: &str) -> DataminerResult<bool>
    {
        let Some(path) = self.path_for(build) else {
            return Ok(false);
        };

        // Same failures as `blob`, so a listing never disagrees with a run
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
