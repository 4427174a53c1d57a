//! # Linux Process Control
//!
//! Memory goes through `/proc/<pid>/mem`; threads are frozen one by one with
//! `ptrace`.
//!
//! ## Suspending a thread
//!
//! `PTRACE_SEIZE` attaches without stopping, `PTRACE_INTERRUPT` then stops the
//! thread, and `waitpid(__WALL)` blocks until the stop is reported. Resuming
//! is `PTRACE_DETACH`, which lets the thread run again and re-delivers any
//! signal that arrived while it was being stopped.
//!
//! `ptrace` tracer identity is per *thread*: the thread that suspended a
//! tracee must be the one resuming it. Sessions are single-threaded, which
//! keeps this true.
//!
//! ## References
//!
//! - [ptrace(2) man page](https://man7.org/linux/man-pages/man2/ptrace.2.html)
//! - [proc_pid_mem(5) man page](https://man7.org/linux/man-pages/man5/proc_pid_mem.5.html)

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::ptr;
use std::sync::{Arc, Mutex};

use libc::{c_int, c_void, pid_t};

use crate::control::{ProcessControl, ProcessMemory};
use crate::error::{DataminerError, DataminerResult};
use crate::types::{Address, ProcessId, ThreadId};

/// `/proc/<pid>/mem` backed memory view
///
/// Closed when the controller detaches; reads after that fail with `NotAttached`.
struct ProcMemory
{
    file: Mutex<Option<File>>,
}

impl ProcMemory
{
    fn close(&self)
    {
        if let Ok(mut file) = self.file.lock() {
            file.take();
        }
    }

    fn with_file<T>(&self, address: Address, len: usize, op: impl FnOnce(&File) -> io::Result<T>) -> DataminerResult<T>
    {
        let guard = self.file.lock().map_err(|_| DataminerError::MemoryAccess {
            address,
            len,
            reason: "memory handle lock poisoned".to_string(),
        })?;
        let file = guard.as_ref().ok_or(DataminerError::NotAttached)?;
        op(file).map_err(|e| DataminerError::MemoryAccess {
            address,
            len,
            reason: e.to_string(),
        })
    }
}

impl ProcessMemory for ProcMemory
{
    fn read_memory(&self, address: Address, len: usize) -> DataminerResult<Vec<u8>>
    {
        self.with_file(address, len, |file| {
            let mut buffer = vec![0u8; len];
            file.read_exact_at(&mut buffer, address.value())?;
            Ok(buffer)
        })
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> DataminerResult<usize>
    {
        self.with_file(address, data.len(), |file| {
            file.write_all_at(data, address.value())?;
            Ok(data.len())
        })
    }
}

struct Attached
{
    pid: ProcessId,
    memory: Arc<ProcMemory>,
    /// Suspended threads and the signal (if any) to re-deliver on resume
    suspended: HashMap<ThreadId, c_int>,
}

/// `ptrace` based process controller
#[derive(Default)]
pub struct LinuxProcessControl
{
    attached: Option<Attached>,
}

impl LinuxProcessControl
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

fn to_pid_t(thread: ThreadId) -> Option<pid_t>
{
    pid_t::try_from(thread.raw()).ok()
}

fn suspend_error(thread: ThreadId, reason: impl std::fmt::Display) -> DataminerError
{
    DataminerError::SuspendFailed {
        thread,
        suspended: 0,
        reason: reason.to_string(),
    }
}

fn ptrace_detach(tid: pid_t, signal: c_int) -> io::Result<()>
{
    // SAFETY: PTRACE_DETACH only takes the signal number in `data`
    let result = unsafe { libc::ptrace(libc::PTRACE_DETACH, tid, ptr::null_mut::<c_void>(), signal as usize as *mut c_void) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Seize, interrupt and wait for `tid` to stop. Returns the signal to re-deliver on resume.
fn stop_thread(tid: pid_t) -> io::Result<c_int>
{
    // SAFETY: plain ptrace requests with null addr/data
    unsafe {
        if libc::ptrace(libc::PTRACE_SEIZE, tid, ptr::null_mut::<c_void>(), ptr::null_mut::<c_void>()) == -1 {
            return Err(io::Error::last_os_error());
        }
        if libc::ptrace(libc::PTRACE_INTERRUPT, tid, ptr::null_mut::<c_void>(), ptr::null_mut::<c_void>()) == -1 {
            let error = io::Error::last_os_error();
            let _ = ptrace_detach(tid, 0);
            return Err(error);
        }
    }

    loop {
        let mut status: c_int = 0;
        // SAFETY: status is a valid out pointer
        let waited = unsafe { libc::waitpid(tid, &mut status, libc::__WALL) };
        if waited == -1 {
            let error = io::Error::last_os_error();
            if error.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            let _ = ptrace_detach(tid, 0);
            return Err(error);
        }

        if libc::WIFSTOPPED(status) {
            // status >> 16 != 0 is the PTRACE_EVENT_STOP from our interrupt;
            // otherwise a real signal stopped it first and must not be lost
            let event = status >> 16;
            let signal = libc::WSTOPSIG(status);
            let pending = if event == 0 && signal != libc::SIGTRAP { signal } else { 0 };
            return Ok(pending);
        }

        if libc::WIFEXITED(status) || libc::WIFSIGNALED(status) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "thread exited while being suspended"));
        }
    }
}

impl ProcessControl for LinuxProcessControl
{
    fn attach(&mut self, pid: ProcessId) -> DataminerResult<()>
    {
        if let Some(attached) = &self.attached {
            return Err(DataminerError::AttachFailed {
                pid,
                reason: format!("controller is already attached to process {}", attached.pid),
            });
        }

        let path = format!("/proc/{pid}/mem");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DataminerError::ProcessNotFound(pid),
                io::ErrorKind::PermissionDenied => DataminerError::PermissionDenied {
                    pid,
                    reason: format!(
                        "cannot open {path}: {e}. Check /proc/sys/kernel/yama/ptrace_scope or run with CAP_SYS_PTRACE"
                    ),
                },
                _ => DataminerError::AttachFailed {
                    pid,
                    reason: e.to_string(),
                },
            })?;

        tracing::debug!(%pid, "Opened process memory");
        self.attached = Some(Attached {
            pid,
            memory: Arc::new(ProcMemory {
                file: Mutex::new(Some(file)),
            }),
            suspended: HashMap::new(),
        });
        Ok(())
    }

    fn threads(&self) -> DataminerResult<Vec<ThreadId>>
    {
        let attached = self.attached()?;
        let enumeration_error = |e: io::Error| DataminerError::ThreadEnumerationFailed {
            pid: attached.pid,
            reason: e.to_string(),
        };

        let mut threads = Vec::new();
        for entry in fs::read_dir(format!("/proc/{}/task", attached.pid)).map_err(enumeration_error)? {
            let entry = entry.map_err(enumeration_error)?;
            if let Some(tid) = entry.file_name().to_str().and_then(|name| name.parse::<u64>().ok()) {
                threads.push(ThreadId(tid));
            }
        }
        threads.sort_unstable();
        Ok(threads)
    }

    fn suspend_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        let attached = self.attached_mut()?;
        if attached.suspended.contains_key(&thread) {
            return Err(suspend_error(thread, "thread is already suspended"));
        }
        let tid = to_pid_t(thread).ok_or_else(|| suspend_error(thread, "thread id out of range"))?;

        let pending = stop_thread(tid).map_err(|e| suspend_error(thread, e))?;
        if pending != 0 {
            tracing::trace!(%thread, signal = pending, "Holding signal until resume");
        }
        attached.suspended.insert(thread, pending);
        Ok(())
    }

    fn resume_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        let attached = self.attached_mut()?;
        let Some(pending) = attached.suspended.remove(&thread) else {
            return Err(DataminerError::ResumeFailed {
                thread,
                reason: "thread was not suspended by this controller".to_string(),
            });
        };
        let tid = to_pid_t(thread).ok_or_else(|| DataminerError::ResumeFailed {
            thread,
            reason: "thread id out of range".to_string(),
        })?;

        match ptrace_detach(tid, pending) {
            Ok(()) => Ok(()),
            // A stopped tracee only disappears when killed; nothing left to resume
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                tracing::debug!(%thread, "Thread vanished while suspended");
                Ok(())
            }
            Err(e) => Err(DataminerError::ResumeFailed {
                thread,
                reason: e.to_string(),
            }),
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

        for (thread, pending) in attached.suspended {
            tracing::warn!(pid = %attached.pid, %thread, "Resuming thread left suspended at detach");
            if let Some(tid) = to_pid_t(thread) {
                let _ = ptrace_detach(tid, pending);
            }
        }
        attached.memory.close();
        tracing::debug!(pid = %attached.pid, "Closed process memory");
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

impl Drop for LinuxProcessControl
{
    fn drop(&mut self)
    {
        if self.attached.is_some() {
            // Best effort - never leave the target frozen
            let _ = self.detach();
        }
    }
}
