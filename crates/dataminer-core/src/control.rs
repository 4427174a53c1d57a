//! # Process Control
//!
//! The interface to the OS facility that attaches to a process, freezes and
//! thaws its threads, and reads or writes its memory.
//!
//! Each platform implements [`ProcessControl`] with its own system APIs:
//!
//! - **Linux**: `/proc/<pid>/mem` for memory, `ptrace` seize/interrupt per thread
//! - **Windows**: `OpenProcess`, ToolHelp thread snapshots, `SuspendThread`/`ResumeThread`
//!
//! The session lifecycle (ordering, partial-failure recovery, guaranteed
//! teardown) lives in [`crate::session`]; implementations here only wrap the
//! primitives.

use std::sync::Arc;

use crate::error::{DataminerError, DataminerResult};
use crate::locator::ProcessDiscovery;
use crate::types::{Address, ProcessId, ThreadId};

/// Read/write access to the memory of an attached process
///
/// Handed to engine factories as an `Arc` so the engine can own it.
pub trait ProcessMemory
{
    /// Read `len` bytes starting at `address`
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess`: the range isn't mapped or readable
    /// - `NotAttached`: the process has been released
    fn read_memory(&self, address: Address, len: usize) -> DataminerResult<Vec<u8>>;

    /// Write `data` at `address`, returning the number of bytes written
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess`: the range isn't mapped or writable
    /// - `NotAttached`: the process has been released
    fn write_memory(&self, address: Address, data: &[u8]) -> DataminerResult<usize>;

    /// Read a little-endian `u32`
    fn read_u32(&self, address: Address) -> DataminerResult<u32>
    {
        let bytes = self.read_memory(address, 4)?;
        let bytes: [u8; 4] = bytes.as_slice().try_into().map_err(|_| short_read(address, 4))?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read a little-endian `u64`
    fn read_u64(&self, address: Address) -> DataminerResult<u64>
    {
        let bytes = self.read_memory(address, 8)?;
        let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| short_read(address, 8))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a 64-bit pointer
    fn read_pointer(&self, address: Address) -> DataminerResult<Address>
    {
        self.read_u64(address).map(Address::new)
    }
}

fn short_read(address: Address, len: usize) -> DataminerError
{
    DataminerError::MemoryAccess {
        address,
        len,
        reason: "short read".to_string(),
    }
}

/// Process-control facility
///
/// ## Lifecycle
///
/// 1. Create a controller: [`create_process_control`]
/// 2. Attach to a process: `attach(pid)`
/// 3. Enumerate, suspend and resume threads; hand out [`ProcessMemory`]
/// 4. Detach: `detach()`
///
/// ## Thread Safety
///
/// Not thread-safe. A controller is attached to at most one process and is
/// driven by a single session.
pub trait ProcessControl
{
    /// Acquire a handle with memory read/write and thread-control rights
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound`: the process exited after discovery
    /// - `PermissionDenied`: the OS refused access
    /// - `AttachFailed`: anything else, including already being attached
    fn attach(&mut self, pid: ProcessId) -> DataminerResult<()>;

    /// Threads currently belonging to the attached process
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: `attach()` hasn't succeeded
    /// - `ThreadEnumerationFailed`: the OS listing failed
    fn threads(&self) -> DataminerResult<Vec<ThreadId>>;

    /// Suspend a single thread, blocking until it is confirmed stopped
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: `attach()` hasn't succeeded
    /// - `SuspendFailed`: the thread couldn't be stopped (it may have exited)
    fn suspend_thread(&mut self, thread: ThreadId) -> DataminerResult<()>;

    /// Resume a thread previously suspended with `suspend_thread()`
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: `attach()` hasn't succeeded
    /// - `ResumeFailed`: the OS call failed
    fn resume_thread(&mut self, thread: ThreadId) -> DataminerResult<()>;

    /// Memory view of the attached process
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: `attach()` hasn't succeeded
    fn memory(&self) -> DataminerResult<Arc<dyn ProcessMemory>>;

    /// Release the process handle
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: nothing to release
    /// - `DetachFailed`: the OS refused to close the handle
    fn detach(&mut self) -> DataminerResult<()>;

    /// Whether a process is currently attached
    fn is_attached(&self) -> bool;

    /// Attached process, if any
    fn pid(&self) -> Option<ProcessId>;
}

/// Create the process controller for the current platform
///
/// ## Platform Support
///
/// - Linux: `LinuxProcessControl`
/// - Windows: `WindowsProcessControl`
///
/// ## Errors
///
/// - `AttachFailed`: no backend for this platform
pub fn create_process_control() -> DataminerResult<Box<dyn ProcessControl>>
{
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(crate::platform::linux::LinuxProcessControl::new()))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(crate::platform::windows::WindowsProcessControl::new()))
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Err(DataminerError::AttachFailed {
            pid: ProcessId(0),
            reason: format!("process control not implemented for platform: {}", std::env::consts::OS),
        })
    }
}

/// Create the process discovery backend for the current platform
///
/// ## Errors
///
/// - `AttachFailed`: no backend for this platform
pub fn create_discovery() -> DataminerResult<Box<dyn ProcessDiscovery>>
{
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(crate::platform::linux::LinuxDiscovery::new()))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(crate::platform::windows::WindowsDiscovery::new()))
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Err(DataminerError::AttachFailed {
            pid: ProcessId(0),
            reason: format!("process discovery not implemented for platform: {}", std::env::consts::OS),
        })
    }
}
