//! Process discovery on Linux.

use std::path::Path;

use sysinfo::System;

use super::maps;
use crate::error::DataminerResult;
use crate::locator::{image_name_matches, ProcessDiscovery};
use crate::types::{ModuleInfo, ProcessEntry, ProcessId};
use crate::version::read_product_version;

/// Discovery backend built on `sysinfo` and `/proc`
///
/// A Wine/Proton game shows up as a Linux process whose name is truncated
/// and whose first argument is the Windows path of the `.exe`, so both are
/// checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxDiscovery;

impl LinuxDiscovery
{
    /// Create a discovery backend
    pub fn new() -> Self
    {
        Self
    }
}

/// File name of a path that may use either separator
fn file_name_of(path: &str) -> &str
{
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl ProcessDiscovery for LinuxDiscovery
{
    fn processes_by_name(&self, name: &str) -> DataminerResult<Vec<ProcessEntry>>
    {
        let system = System::new_all();

        let mut entries = Vec::new();
        for (pid, process) in system.processes() {
            // sysinfo lists tasks next to processes; only thread group leaders are wanted
            if process.thread_kind().is_some() {
                continue;
            }

            let image = process.name().to_string_lossy();
            let launched_as = process
                .cmd()
                .first()
                .map(|arg| file_name_of(&arg.to_string_lossy()).to_string());
            let matches = image_name_matches(&image, name)
                || launched_as.as_deref().is_some_and(|arg| image_name_matches(arg, name));
            if !matches {
                continue;
            }

            let pid = ProcessId(pid.as_u32());
            let main_module = match maps::read_maps(pid) {
                Ok(mappings) => maps::main_module(&mappings, name, process.exe()),
                Err(e) => {
                    tracing::debug!(%pid, error = %e, "Failed to read memory map");
                    None
                }
            };

            entries.push(ProcessEntry {
                pid,
                name: launched_as.unwrap_or_else(|| image.into_owned()),
                main_module,
            });
        }

        // The process table is a hash map; give callers a reproducible order
        entries.sort_by_key(|entry| entry.pid);
        Ok(entries)
    }

    fn product_version(&self, module: &ModuleInfo) -> DataminerResult<String>
    {
        read_product_version(Path::new(&module.path))
    }
}
