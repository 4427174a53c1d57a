//! # Configuration Resolver
//!
//! Pairs a running instance with the address configuration for its build.
//!
//! The first candidate (in locator order) whose build is registered wins.
//! Several simultaneously running builds are not expected; when they do
//! occur the choice is not "the best" one, only the first, and a warning is
//! logged so the ambiguity is visible.

use crate::config::AddressConfiguration;
use crate::error::DataminerResult;
use crate::registry::ConfigurationRegistry;
use crate::types::RunningInstance;

/// Find the first candidate with a registered configuration
///
/// Only the matching blob is deserialized.
///
/// ## Errors
///
/// - `InvalidConfiguration`: the matching blob doesn't parse. This is fatal;
///   later candidates are not tried.
/// - Registry backend errors
///
/// ## Example
///
/// ```rust
/// use dataminer_core::registry::MemoryRegistry;
/// use dataminer_core::resolver::resolve;
/// use dataminer_core::types::{Address, ModuleInfo, ProcessId, RunningInstance};
///
/// let module = ModuleInfo::new("game.exe", "game.exe", Address::new(0x140000000), 0x1000);
/// let candidates = vec![
///     RunningInstance::new(ProcessId(10), "123", module.clone()),
///     RunningInstance::new(ProcessId(11), "124", module),
/// ];
/// let registry = MemoryRegistry::new().with("124", r#"{"reference_base": "0x400000"}"#);
///
/// let (instance, _config) = resolve(candidates, &registry)?.expect("build 124 is registered");
/// assert_eq!(instance.pid, ProcessId(11));
/// # Ok::<(), dataminer_core::error::DataminerError>(())
/// ```
pub fn resolve<I, R>(candidates: I, registry: &R) -> DataminerResult<Option<(RunningInstance, AddressConfiguration)>>
where
    I: IntoIterator<Item = RunningInstance>,
    R: ConfigurationRegistry + ?Sized,
{
    let mut candidates = candidates.into_iter();

    while let Some(instance) = candidates.next() {
        let Some(blob) = registry.blob(&instance.build)? else {
            tracing::debug!(pid = %instance.pid, build = %instance.build, "No configuration for build");
            continue;
        };

        let config = AddressConfiguration::from_json(&instance.build, &blob)?;
        tracing::info!(pid = %instance.pid, build = %instance.build, "Resolved configuration");

        let passed_over: Vec<String> = candidates
            .by_ref()
            .filter(|other| match registry.contains(&other.build) {
                Ok(configured) => configured,
                Err(e) => {
                    tracing::warn!(pid = %other.pid, build = %other.build, error = %e, "Could not check configuration of another instance");
                    false
                }
            })
            .map(|other| format!("{} (build {})", other.pid, other.build))
            .collect();
        if !passed_over.is_empty() {
            tracing::warn!(
                chosen = %instance.pid,
                others = ?passed_over,
                "Several configured instances are running; using the first one"
            );
        }

        return Ok(Some((instance, config)));
    }

    Ok(None)
}
