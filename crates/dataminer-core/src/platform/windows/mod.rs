//! # Windows Implementation
//!
//! ToolHelp snapshots for processes, modules and threads; `OpenProcess` for
//! memory access; `SuspendThread`/`ResumeThread` for freezing.

mod control;
mod discovery;

pub use control::WindowsProcessControl;
pub use discovery::WindowsDiscovery;

/// Decode a nul-terminated UTF-16 buffer as found in ToolHelp entries
pub(crate) fn wide_to_string(wide: &[u16]) -> String
{
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}
