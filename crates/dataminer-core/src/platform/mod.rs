//! # Platform-Specific Implementations
//!
//! Each platform has its own submodule implementing [`crate::control::ProcessControl`]
//! and [`crate::locator::ProcessDiscovery`] with its native APIs:
//!
//! - **Linux**: `/proc`, `ptrace` and `sysinfo`. Covers the game running under Wine/Proton.
//!   - See: [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - **Windows**: ToolHelp snapshots and thread suspension
//!   - See: [Tool Help Library](https://learn.microsoft.com/en-us/windows/win32/toolhelp/tool-help-library)

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;
