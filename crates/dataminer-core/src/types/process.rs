//! Process, thread and module types.

use std::fmt;
use std::path::PathBuf;

use super::Address;

/// Process identifier (PID)
///
/// ## Example
///
/// ```rust
/// use dataminer_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(u32::from(pid), 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// - **Linux**: Thread ID (TID) from `/proc/<pid>/task`
/// - **Windows**: Thread ID from a ToolHelp snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// A module (executable image) loaded into a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo
{
    /// File name of the module, e.g. `BorderlandsGOTY.exe`
    pub name: String,
    /// Path of the image on disk, used to read its version resource
    pub path: PathBuf,
    /// Address the image is loaded at
    pub base: Address,
    /// Size of the mapped image in bytes
    pub size: u64,
}

impl ModuleInfo
{
    /// Create a new module description
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, base: Address, size: u64) -> Self
    {
        Self {
            name: name.into(),
            path: path.into(),
            base,
            size,
        }
    }

    /// A module with a null base or no mapped bytes is not actually loaded
    pub fn is_loaded(&self) -> bool
    {
        !self.base.is_null() && self.size > 0
    }
}

/// A process reported by the discovery backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry
{
    /// Process identifier
    pub pid: ProcessId,
    /// Image name as reported by the OS
    pub name: String,
    /// Main executable module, `None` if it could not be inspected
    pub main_module: Option<ModuleInfo>,
}

/// A running instance of the target application with a known build
///
/// Produced by the locator; consumed either by a session or discarded by the
/// resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningInstance
{
    /// Process identifier
    pub pid: ProcessId,
    /// Build identifier (last dot-separated component of the product version)
    pub build: String,
    /// Main executable module with its actual load base
    pub main_module: ModuleInfo,
}

impl RunningInstance
{
    /// Create a new running instance
    pub fn new(pid: ProcessId, build: impl Into<String>, main_module: ModuleInfo) -> Self
    {
        Self {
            pid,
            build: build.into(),
            main_module,
        }
    }
}
