//! # Error Types
//!
//! General error handling for the datamining harness.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and readable error messages.

use thiserror::Error;

use crate::types::{Address, ProcessId, ThreadId};

/// Boxed error type returned by extraction routines.
///
/// Routines are caller code, so the harness does not constrain their error
/// type beyond being a thread-safe `std::error::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for harness operations
///
/// ## Error Categories
///
/// 1. **Process errors**: ProcessNotFound, PermissionDenied, AttachFailed, NotAttached, InstanceBusy, SessionClosed
/// 2. **Thread errors**: ThreadEnumerationFailed, SuspendFailed, ResumeFailed, DetachFailed
/// 3. **Configuration errors**: InvalidConfiguration, Rebase, VersionResource
/// 4. **Session errors**: EngineFailed, Extraction
/// 5. **Memory errors**: MemoryAccess
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum DataminerError
{
    /// The process with the given PID doesn't exist or has exited
    ///
    /// This happens when the process exited between discovery and attach.
    #[error("Process not found: PID {0}")]
    ProcessNotFound(ProcessId),

    /// Insufficient permissions to control the target process
    ///
    /// On Linux this usually means `ptrace_scope` forbids attaching to a
    /// non-child process; run as the same user with `CAP_SYS_PTRACE` or as root.
    /// On Windows the process may be running elevated.
    #[error("Failed to attach to process {pid}: permission denied: {reason}")]
    PermissionDenied
    {
        /// The process we tried to attach to
        pid: ProcessId,
        /// What the OS refused, with a hint where one helps
        reason: String,
    },

    /// Failed to attach to a process
    ///
    /// General error for attachment failures that don't fit into
    /// `ProcessNotFound` or `PermissionDenied`.
    #[error("Failed to attach to process {pid}: {reason}")]
    AttachFailed
    {
        /// The process we tried to attach to
        pid: ProcessId,
        /// Details about what went wrong
        reason: String,
    },

    /// Operation requires an attached process
    #[error("Not attached to a process")]
    NotAttached,

    /// Another session already owns this running instance
    #[error("Process {0} is already owned by an active session")]
    InstanceBusy(ProcessId),

    /// A session can only be run once
    #[error("Session for process {0} has already run")]
    SessionClosed(ProcessId),

    /// Failed to list the threads of the attached process
    #[error("Failed to enumerate threads of process {pid}: {reason}")]
    ThreadEnumerationFailed
    {
        /// The attached process
        pid: ProcessId,
        /// Details about what went wrong
        reason: String,
    },

    /// Failed to suspend one of the target's threads
    ///
    /// By the time this error is reported, every thread that was suspended
    /// before the failure has already been resumed again.
    #[error("Failed to suspend thread {thread} ({suspended} thread(s) were suspended and have been resumed): {reason}")]
    SuspendFailed
    {
        /// Thread whose suspension failed
        thread: ThreadId,
        /// Number of threads that had been suspended before the failure
        suspended: usize,
        /// Details about what went wrong
        reason: String,
    },

    /// Failed to resume a suspended thread
    #[error("Failed to resume thread {thread}: {reason}")]
    ResumeFailed
    {
        /// Thread whose resumption failed
        thread: ThreadId,
        /// Details about what went wrong
        reason: String,
    },

    /// Failed to release the process handle
    #[error("Failed to detach from process {pid}: {reason}")]
    DetachFailed
    {
        /// The attached process
        pid: ProcessId,
        /// Details about what went wrong
        reason: String,
    },

    /// A registry blob could not be deserialized into an address configuration
    #[error("Invalid configuration for build {build}: {source}")]
    InvalidConfiguration
    {
        /// Build identifier the blob was registered under
        build: String,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// Rebasing the configuration against the loaded module failed
    #[error("Failed to rebase configuration: {0}")]
    Rebase(#[from] RebaseError),

    /// The module's version resource is missing or malformed
    #[error("Failed to read version resource: {0}")]
    VersionResource(String),

    /// The caller-supplied engine factory failed
    #[error("Failed to create engine: {0}")]
    EngineFailed(String),

    /// The extraction routine failed
    ///
    /// This is only ever returned after the target process has been resumed
    /// and released.
    #[error("Extraction failed: {0}")]
    Extraction(#[source] BoxError),

    /// Reading or writing target memory failed
    #[error("Memory access failed at {address} ({len} bytes): {reason}")]
    MemoryAccess
    {
        /// Start of the access
        address: Address,
        /// Length of the access
        len: usize,
        /// Details about what went wrong
        reason: String,
    },

    /// I/O error (registry files, dump files, `/proc` entries)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a configuration cannot be rebased.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RebaseError
{
    /// The configuration doesn't record the base its addresses were captured against
    #[error("configuration has no reference base address")]
    MissingReferenceBase,

    /// The module to rebase against could not be inspected
    #[error("main module {0} is not loaded or could not be inspected")]
    ModuleUnavailable(String),

    /// An address lies below the reference base or the result overflows
    #[error("address {name} ({address}) cannot be relocated from {reference} to {actual}")]
    OutOfRange
    {
        /// Name of the offending entry
        name: String,
        /// Static address of the entry
        address: Address,
        /// Recorded reference base
        reference: Address,
        /// Actual load base
        actual: Address,
    },
}

/// Convenience type alias for `Result<T, DataminerError>`
///
/// ```rust
/// use dataminer_core::error::DataminerResult;
/// fn foo() -> DataminerResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type DataminerResult<T> = std::result::Result<T, DataminerError>;
