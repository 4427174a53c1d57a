//! # Windows Process Control
//!
//! `OpenProcess` grants memory and suspend/resume rights; threads are listed
//! from a ToolHelp snapshot and frozen with `SuspendThread`, which returns
//! once the thread is guaranteed not to run user code.
//!
//! ## References
//!
//! - [SuspendThread](https://learn.microsoft.com/en-us/windows/win32/api/processthreadsapi/nf-processthreadsapi-suspendthread)
//! - [ReadProcessMemory](https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-readprocessmemory)

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem;
use std::sync::{Arc, Mutex};

use windows::Win32::Foundation::{CloseHandle, E_ACCESSDENIED, ERROR_INVALID_PARAMETER, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
};
use windows::Win32::System::Threading::{
    OpenProcess, OpenThread, ResumeThread, SuspendThread, PROCESS_QUERY_INFORMATION, PROCESS_SUSPEND_RESUME,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE, THREAD_SUSPEND_RESUME,
};

use crate::control::{ProcessControl, ProcessMemory};
use crate::error::{DataminerError, DataminerResult};
use crate::types::{Address, ProcessId, ThreadId};

/// `ReadProcessMemory`/`WriteProcessMemory` view over the process handle
///
/// The handle is owned here and closed on detach; reads after that fail
/// with `NotAttached`.
struct HandleMemory
{
    handle: Mutex<Option<HANDLE>>,
}

impl HandleMemory
{
    fn handle(&self, address: Address, len: usize) -> DataminerResult<HANDLE>
    {
        let guard = self.handle.lock().map_err(|_| DataminerError::MemoryAccess {
            address,
            len,
            reason: "process handle lock poisoned".to_string(),
        })?;
        (*guard).ok_or(DataminerError::NotAttached)
    }

    fn close(&self) -> windows::core::Result<()>
    {
        let Ok(mut guard) = self.handle.lock() else {
            return Ok(());
        };
        match guard.take() {
            // SAFETY: the handle came from OpenProcess and is taken out before closing
            Some(handle) => unsafe { CloseHandle(handle) },
            None => Ok(()),
        }
    }
}

impl ProcessMemory for HandleMemory
{
    fn read_memory(&self, address: Address, len: usize) -> DataminerResult<Vec<u8>>
    {
        let handle = self.handle(address, len)?;
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;

        // SAFETY: buffer is valid for `len` bytes
        unsafe {
            ReadProcessMemory(
                handle,
                address.value() as *const c_void,
                buffer.as_mut_ptr().cast(),
                len,
                Some(&mut read),
            )
        }
        .map_err(|e| DataminerError::MemoryAccess {
            address,
            len,
            reason: e.message(),
        })?;

        buffer.truncate(read);
        Ok(buffer)
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> DataminerResult<usize>
    {
        let handle = self.handle(address, data.len())?;
        let mut written = 0usize;

        // SAFETY: data is valid for its length
        unsafe {
            WriteProcessMemory(
                handle,
                address.value() as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| DataminerError::MemoryAccess {
            address,
            len: data.len(),
            reason: e.message(),
        })?;

        Ok(written)
    }
}

struct Attached
{
    pid: ProcessId,
    memory: Arc<HandleMemory>,
    /// Open thread handles of the threads we suspended
    suspended: HashMap<ThreadId, HANDLE>,
}

/// `SuspendThread` based process controller
#[derive(Default)]
pub struct WindowsProcessControl
{
    attached: Option<Attached>,
}

impl WindowsProcessControl
{
    /// Create a detached controller
    pub fn new() -> Self
    {
        Self::default()
    }

    fn attached(&self) -> DataminerResult<&Attached>
    {
        self.attached.as_ref().ok_or(DataminerError::NotAttached)
    }

    fn attached_mut(&mut self) -> DataminerResult<&mut Attached>
    {
        self.attached.as_mut().ok_or(DataminerError::NotAttached)
    }
}

fn thread_handle_id(thread: ThreadId) -> Option<u32>
{
    u32::try_from(thread.raw()).ok()
}

fn suspend_error(thread: ThreadId, reason: impl std::fmt::Display) -> DataminerError
{
    DataminerError::SuspendFailed {
        thread,
        suspended: 0,
        reason: reason.to_string(),
    }
}

impl ProcessControl for WindowsProcessControl
{
    fn attach(&mut self, pid: ProcessId) -> DataminerResult<()>
    {
        if let Some(attached) = &self.attached {
            return Err(DataminerError::AttachFailed {
                pid,
                reason: format!("controller is already attached to process {}", attached.pid),
            });
        }

        let access = PROCESS_VM_READ
            | PROCESS_VM_WRITE
            | PROCESS_VM_OPERATION
            | PROCESS_QUERY_INFORMATION
            | PROCESS_SUSPEND_RESUME;

        // SAFETY: plain handle acquisition; ownership moves into HandleMemory
        let handle = unsafe { OpenProcess(access, false, pid.0) }.map_err(|e| {
            if e.code() == E_ACCESSDENIED {
                DataminerError::PermissionDenied {
                    pid,
                    reason: format!("OpenProcess: {}", e.message()),
                }
            } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                DataminerError::ProcessNotFound(pid)
            } else {
                DataminerError::AttachFailed {
                    pid,
                    reason: e.message(),
                }
            }
        })?;

        tracing::debug!(%pid, "Opened process handle");
        self.attached = Some(Attached {
            pid,
            memory: Arc::new(HandleMemory {
                handle: Mutex::new(Some(handle)),
            }),
            suspended: HashMap::new(),
        });
        Ok(())
    }

    fn threads(&self) -> DataminerResult<Vec<ThreadId>>
    {
        let attached = self.attached()?;
        let enumeration_error = |e: windows::core::Error| DataminerError::ThreadEnumerationFailed {
            pid: attached.pid,
            reason: e.message(),
        };

        let mut threads = Vec::new();
        // SAFETY: the snapshot handle is closed below; the entry is sized before use
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0).map_err(enumeration_error)?;
            let mut entry = THREADENTRY32 {
                dwSize: mem::size_of::<THREADENTRY32>() as u32,
                ..Default::default()
            };

            let mut more = Thread32First(snapshot, &mut entry).is_ok();
            while more {
                if entry.th32OwnerProcessID == attached.pid.0 {
                    threads.push(ThreadId(u64::from(entry.th32ThreadID)));
                }
                more = Thread32Next(snapshot, &mut entry).is_ok();
            }
            let _ = CloseHandle(snapshot);
        }

        Ok(threads)
    }

    fn suspend_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        let attached = self.attached_mut()?;
        if attached.suspended.contains_key(&thread) {
            return Err(suspend_error(thread, "thread is already suspended"));
        }
        let id = thread_handle_id(thread).ok_or_else(|| suspend_error(thread, "thread id out of range"))?;

        // SAFETY: the thread handle is either stored for resume or closed here
        unsafe {
            let handle = OpenThread(THREAD_SUSPEND_RESUME, false, id).map_err(|e| suspend_error(thread, e.message()))?;
            if SuspendThread(handle) == u32::MAX {
                let error = windows::core::Error::from_win32();
                let _ = CloseHandle(handle);
                return Err(suspend_error(thread, error.message()));
            }
            attached.suspended.insert(thread, handle);
        }
        Ok(())
    }

    fn resume_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        let attached = self.attached_mut()?;
        let Some(handle) = attached.suspended.remove(&thread) else {
            return Err(DataminerError::ResumeFailed {
                thread,
                reason: "thread was not suspended by this controller".to_string(),
            });
        };

        // SAFETY: handle was opened by suspend_thread and is closed exactly once
        unsafe {
            let previous = ResumeThread(handle);
            let error = (previous == u32::MAX).then(windows::core::Error::from_win32);
            let _ = CloseHandle(handle);
            match error {
                Some(e) => Err(DataminerError::ResumeFailed {
                    thread,
                    reason: e.message(),
                }),
                None => Ok(()),
            }
        }
    }

    fn memory(&self) -> DataminerResult<Arc<dyn ProcessMemory>>
    {
        let memory: Arc<dyn ProcessMemory> = self.attached()?.memory.clone();
        Ok(memory)
    }

    fn detach(&mut self) -> DataminerResult<()>
    {
        let attached = self.attached.take().ok_or(DataminerError::NotAttached)?;

        for (thread, handle) in attached.suspended {
            tracing::warn!(pid = %attached.pid, %thread, "Resuming thread left suspended at detach");
            // SAFETY: handle was opened by suspend_thread
            unsafe {
                ResumeThread(handle);
                let _ = CloseHandle(handle);
            }
        }

        attached.memory.close().map_err(|e| DataminerError::DetachFailed {
            pid: attached.pid,
            reason: e.message(),
        })?;
        tracing::debug!(pid = %attached.pid, "Closed process handle");
        Ok(())
    }

    fn is_attached(&self) -> bool
    {
        self.attached.is_some()
    }

    fn pid(&self) -> Option<ProcessId>
    {
        self.attached.as_ref().map(|attached| attached.pid)
    }
}

impl Drop for WindowsProcessControl
{
    fn drop(&mut self)
    {
        if self.attached.is_some() {
            // Best effort - never leave the target frozen
            let _ = self.detach();
        }
    }
}
