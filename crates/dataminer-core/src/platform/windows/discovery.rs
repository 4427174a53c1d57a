//! Process discovery on Windows.

use std::io;
use std::mem;
use std::path::PathBuf;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Process32FirstW, Process32NextW, MODULEENTRY32W, PROCESSENTRY32W,
    TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};

use super::wide_to_string;
use crate::error::{DataminerError, DataminerResult};
use crate::locator::{image_name_matches, ProcessDiscovery};
use crate::types::{Address, ModuleInfo, ProcessEntry, ProcessId};
use crate::version::read_product_version;

/// Closes a snapshot handle when dropped
struct Snapshot(HANDLE);

impl Drop for Snapshot
{
    fn drop(&mut self)
    {
        // SAFETY: the handle came from CreateToolhelp32Snapshot and is closed once
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Discovery backend built on ToolHelp snapshots
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsDiscovery;

impl WindowsDiscovery
{
    /// Create a discovery backend
    pub fn new() -> Self
    {
        Self
    }
}

/// First module of a process, which is its main executable
fn main_module(pid: ProcessId) -> Option<ModuleInfo>
{
    // SAFETY: snapshot handle is owned by the guard; the entry is sized before use
    unsafe {
        let snapshot = Snapshot(CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid.0).ok()?);
        let mut entry = MODULEENTRY32W {
            dwSize: mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };
        Module32FirstW(snapshot.0, &mut entry).ok()?;

        Some(ModuleInfo::new(
            wide_to_string(&entry.szModule),
            PathBuf::from(wide_to_string(&entry.szExePath)),
            Address::new(entry.modBaseAddr as u64),
            u64::from(entry.modBaseSize),
        ))
    }
}

impl ProcessDiscovery for WindowsDiscovery
{
    fn processes_by_name(&self, name: &str) -> DataminerResult<Vec<ProcessEntry>>
    {
        let mut entries = Vec::new();

        // SAFETY: snapshot handle is owned by the guard; the entry is sized before use
        unsafe {
            let snapshot = Snapshot(
                CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                    .map_err(|e| DataminerError::Io(io::Error::other(format!("process snapshot failed: {e}"))))?,
            );
            let mut entry = PROCESSENTRY32W {
                dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut more = Process32FirstW(snapshot.0, &mut entry).is_ok();
            while more {
                let image = wide_to_string(&entry.szExeFile);
                if image_name_matches(&image, name) {
                    let pid = ProcessId(entry.th32ProcessID);
                    let main_module = main_module(pid);
                    if main_module.is_none() {
                        tracing::debug!(%pid, "Failed to inspect main module");
                    }
                    entries.push(ProcessEntry {
                        pid,
                        name: image,
                        main_module,
                    });
                }
                more = Process32NextW(snapshot.0, &mut entry).is_ok();
            }
        }

        // ToolHelp order is the enumeration order callers rely on
        Ok(entries)
    }

    fn product_version(&self, module: &ModuleInfo) -> DataminerResult<String>
    {
        read_product_version(&module.path)
    }
}
