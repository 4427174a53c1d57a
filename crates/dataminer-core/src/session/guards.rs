//! # RAII Guards for Session Teardown
//!
//! Guards that undo an acquisition when dropped, so the target process is
//! never left attached or frozen, even if the extraction routine panics.
//!
//! ## Guards
//!
//! - **AttachGuard**: Attaches to a process and detaches on drop
//! - **SuspendGuard**: Suspends every thread and resumes them on drop, in reverse order
//!
//! The normal path finishes both explicitly with [`SuspendGuard::resume`] and
//! [`AttachGuard::detach`] so that their errors can be reported; `Drop` is the
//! best-effort backstop.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::control::{ProcessControl, ProcessMemory};
use crate::error::{DataminerError, DataminerResult};
use crate::types::{ProcessId, ThreadId};

/// Rescans before giving up on a process that keeps starting threads
const MAX_SUSPEND_PASSES: usize = 16;

/// RAII guard holding a process attachment.
///
/// ## Example
///
/// ```rust,no_run
/// use dataminer_core::control::create_process_control;
/// use dataminer_core::session::guards::{AttachGuard, SuspendGuard};
/// use dataminer_core::types::ProcessId;
///
/// let mut control = create_process_control()?;
/// let mut attached = AttachGuard::attach(control.as_mut(), ProcessId::from(12345))?;
/// let suspended = SuspendGuard::suspend_all(attached.control())?;
/// // Every thread of the process is stopped here
/// suspended.resume()?;
/// attached.detach()?;
/// # Ok::<(), dataminer_core::error::DataminerError>(())
/// ```
pub struct AttachGuard<'c>
{
    control: &'c mut dyn ProcessControl,
    pid: ProcessId,
    active: bool,
}

impl<'c> AttachGuard<'c>
{
    /// Attach `control` to `pid`.
    ///
    /// ## Errors
    ///
    /// Whatever `ProcessControl::attach` reports.
    pub fn attach(control: &'c mut dyn ProcessControl, pid: ProcessId) -> DataminerResult<Self>
    {
        tracing::info!(%pid, "Attaching");
        control.attach(pid)?;
        Ok(Self {
            control,
            pid,
            active: true,
        })
    }

    /// The attached process
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// The attached controller
    pub fn control(&mut self) -> &mut dyn ProcessControl
    {
        &mut *self.control
    }

    /// Release the process handle before the guard is dropped.
    ///
    /// ## Errors
    ///
    /// - `DetachFailed`: the controller could not release the handle
    pub fn detach(mut self) -> DataminerResult<()>
    {
        self.active = false;
        self.control.detach()?;
        tracing::info!(pid = %self.pid, "Detached");
        Ok(())
    }
}

impl Drop for AttachGuard<'_>
{
    fn drop(&mut self)
    {
        if self.active {
            // Best effort detach - ignore errors
            if let Err(e) = self.control.detach() {
                tracing::error!(pid = %self.pid, error = %e, "Failed to detach during unwind");
            }
        }
    }
}

/// RAII guard holding every thread of the attached process suspended.
pub struct SuspendGuard<'a>
{
    control: &'a mut dyn ProcessControl,
    threads: SmallVec<[ThreadId; 64]>,
    active: bool,
}

impl<'a> SuspendGuard<'a>
{
    /// Enumerate and suspend every thread of the attached process.
    ///
    /// Blocks until each thread is confirmed stopped. The thread list is read
    /// again after every pass, and threads started in the meantime are
    /// suspended too, until a pass finds nothing new. If any suspension
    /// fails, every thread suspended so far is resumed again (in reverse
    /// order) before the error is returned.
    ///
    /// ## Errors
    ///
    /// - `ThreadEnumerationFailed`: the thread list couldn't be read, or was empty
    /// - `SuspendFailed`: a thread couldn't be stopped; `suspended` counts the
    ///   threads that were stopped (and have been resumed) before it
    pub fn suspend_all(control: &'a mut dyn ProcessControl) -> DataminerResult<Self>
    {
        let mut pending = control.threads()?;
        if pending.is_empty() {
            return Err(DataminerError::ThreadEnumerationFailed {
                pid: control.pid().unwrap_or(ProcessId(0)),
                reason: "process has no threads".to_string(),
            });
        }

        let mut guard = Self {
            control,
            threads: SmallVec::with_capacity(pending.len()),
            active: true,
        };

        let mut passes = 0usize;
        while !pending.is_empty() {
            passes += 1;
            if passes > MAX_SUSPEND_PASSES {
                let pid = guard.control.pid().unwrap_or(ProcessId(0));
                guard.abandon();
                return Err(DataminerError::ThreadEnumerationFailed {
                    pid,
                    reason: format!("threads still appearing after {MAX_SUSPEND_PASSES} suspend passes"),
                });
            }
            for thread in pending {
                if let Err(e) = guard.control.suspend_thread(thread) {
                    let suspended = guard.threads.len();
                    tracing::warn!(%thread, suspended, error = %e, "Suspend failed, resuming suspended threads");
                    guard.abandon();

                    let reason = match e {
                        DataminerError::SuspendFailed { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    return Err(DataminerError::SuspendFailed {
                        thread,
                        suspended,
                        reason,
                    });
                }
                tracing::trace!(%thread, "Suspended thread");
                guard.threads.push(thread);
            }

            // Threads started while the pass was running
            let current = match guard.control.threads() {
                Ok(current) => current,
                Err(e) => {
                    guard.abandon();
                    return Err(e);
                }
            };
            pending = current.into_iter().filter(|thread| !guard.threads.contains(thread)).collect();
            if !pending.is_empty() {
                tracing::debug!(new = pending.len(), "Threads appeared while suspending");
            }
        }

        tracing::info!(threads = guard.threads.len(), passes, "Suspended all threads");
        Ok(guard)
    }

    /// Resume everything suspended so far and disarm the guard
    fn abandon(&mut self)
    {
        if let Err(resume) = self.resume_all() {
            tracing::error!(error = %resume, "Failed to resume a thread while recovering from suspend failure");
        }
        self.active = false;
    }

    /// Threads held suspended, in suspension order
    pub fn threads(&self) -> &[ThreadId]
    {
        &self.threads
    }

    /// Memory view of the suspended process
    ///
    /// ## Errors
    ///
    /// - `NotAttached`: the controller lost its process
    pub fn memory(&self) -> DataminerResult<Arc<dyn ProcessMemory>>
    {
        self.control.memory()
    }

    /// Resume every held thread before the guard is dropped.
    ///
    /// Every thread gets exactly one resume attempt, even if an earlier one
    /// fails; the first failure is returned.
    ///
    /// ## Errors
    ///
    /// - `ResumeFailed`: at least one thread couldn't be resumed
    pub fn resume(mut self) -> DataminerResult<()>
    {
        self.active = false;
        let threads = self.threads.len();
        self.resume_all()?;
        tracing::info!(threads, "Resumed all threads");
        Ok(())
    }

    fn resume_all(&mut self) -> DataminerResult<()>
    {
        let mut first_error = None;
        while let Some(thread) = self.threads.pop() {
            match self.control.resume_thread(thread) {
                Ok(()) => tracing::trace!(%thread, "Resumed thread"),
                Err(e) => {
                    tracing::error!(%thread, error = %e, "Failed to resume thread");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SuspendGuard<'_>
{
    fn drop(&mut self)
    {
        if self.active {
            // Best effort resume - errors are already logged
            let _ = self.resume_all();
        }
    }
}
