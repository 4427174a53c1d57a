//! # Process Locator
//!
//! Finds running instances of the target application and works out which
//! build each of them is.
//!
//! The OS side is behind [`ProcessDiscovery`]; the locator only applies the
//! policy: keep the enumeration order, derive a build identifier from each
//! candidate's product version, and skip candidates that can't be inspected.

use crate::error::DataminerResult;
use crate::types::{ModuleInfo, ProcessEntry, RunningInstance};

/// OS process-enumeration facility
pub trait ProcessDiscovery
{
    /// List processes whose image name matches `name`, in enumeration order
    ///
    /// Matching is case-insensitive and ignores a trailing `.exe`.
    ///
    /// ## Errors
    ///
    /// Backends report failures to read the process table itself.
    fn processes_by_name(&self, name: &str) -> DataminerResult<Vec<ProcessEntry>>;

    /// Product version string of a module, e.g. `"1.0.0.124"`
    ///
    /// ## Errors
    ///
    /// - `Io`: the module image can't be read
    /// - `VersionResource`: the image carries no usable version
    fn product_version(&self, module: &ModuleInfo) -> DataminerResult<String>;
}

impl<D: ProcessDiscovery + ?Sized> ProcessDiscovery for &D
{
    fn processes_by_name(&self, name: &str) -> DataminerResult<Vec<ProcessEntry>>
    {
        (**self).processes_by_name(name)
    }

    fn product_version(&self, module: &ModuleInfo) -> DataminerResult<String>
    {
        (**self).product_version(module)
    }
}

/// Derive a build identifier from a product version string
///
/// Only the last dot-separated component identifies the build; the leading
/// components are not reliable.
///
/// ```rust
/// use dataminer_core::locator::build_identifier;
///
/// assert_eq!(build_identifier("1.0.0.124"), Some("124"));
/// assert_eq!(build_identifier("124"), Some("124"));
/// assert_eq!(build_identifier("1.0.0."), None);
/// ```
pub fn build_identifier(product_version: &str) -> Option<&str>
{
    product_version
        .trim()
        .rsplit('.')
        .next()
        .map(str::trim)
        .filter(|build| !build.is_empty())
}

/// Whether an OS image name refers to the application called `name`
///
/// ```rust
/// use dataminer_core::locator::image_name_matches;
///
/// assert!(image_name_matches("BorderlandsGOTY.exe", "borderlandsgoty"));
/// assert!(image_name_matches("borderlandsgoty", "BorderlandsGOTY.exe"));
/// assert!(!image_name_matches("Borderlands2.exe", "borderlandsgoty"));
/// ```
pub fn image_name_matches(image: &str, name: &str) -> bool
{
    fn stem(value: &str) -> &str
    {
        let value = value.trim();
        match value.len().checked_sub(4) {
            Some(split) if value.is_char_boundary(split) && value[split..].eq_ignore_ascii_case(".exe") => {
                &value[..split]
            }
            _ => value,
        }
    }

    stem(image).eq_ignore_ascii_case(stem(name))
}

/// Enumerates candidate instances through a [`ProcessDiscovery`] backend
#[derive(Debug, Clone)]
pub struct ProcessLocator<D>
{
    discovery: D,
}

impl<D: ProcessDiscovery> ProcessLocator<D>
{
    /// Create a locator over a discovery backend
    pub fn new(discovery: D) -> Self
    {
        Self { discovery }
    }

    /// The underlying discovery backend
    pub fn discovery(&self) -> &D
    {
        &self.discovery
    }

    /// Running instances of `process_name` whose build could be determined
    ///
    /// Order is the backend's enumeration order. An empty result is the
    /// normal "nothing running" outcome, not an error. Candidates whose main
    /// module or version can't be read are skipped with a warning.
    ///
    /// ## Errors
    ///
    /// Only failures to enumerate processes at all are reported.
    pub fn find_candidates(&self, process_name: &str) -> DataminerResult<Vec<RunningInstance>>
    {
        let entries = self.discovery.processes_by_name(process_name)?;
        tracing::debug!(process_name, matches = entries.len(), "Enumerated processes");

        let mut candidates = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(module) = entry.main_module else {
                tracing::warn!(pid = %entry.pid, "Skipping process whose main module could not be inspected");
                continue;
            };

            let version = match self.discovery.product_version(&module) {
                Ok(version) => version,
                Err(e) => {
                    tracing::warn!(pid = %entry.pid, module = %module.name, error = %e, "Skipping process with unreadable version");
                    continue;
                }
            };

            let Some(build) = build_identifier(&version) else {
                tracing::warn!(pid = %entry.pid, version, "Skipping process without a build number");
                continue;
            };

            tracing::debug!(pid = %entry.pid, version, build, base = %module.base, "Found candidate");
            candidates.push(RunningInstance::new(entry.pid, build, module));
        }

        Ok(candidates)
    }
}
