//! # Process Session
//!
//! One attach, suspend, extract, resume, detach cycle against one running
//! instance.
//!
//! ## States
//!
//! ```text
//! Unattached -> Attached -> Suspended -> Active -> Resumed -> Closed
//! ```
//!
//! - **Attached**: the controller holds a handle with memory and thread rights
//! - **Suspended**: every thread is confirmed stopped
//! - **Active**: the engine is built and the extraction routine is running
//! - **Resumed**: every suspended thread has been given back to the scheduler
//! - **Closed**: the handle is released; the session cannot be run again
//!
//! Once a session is attached, resume and detach run exactly once on every
//! way out, in that order: normal return, engine failure, routine failure.
//! A panicking routine unwinds through the guards in [`guards`], which do
//! the same on a best-effort basis.
//!
//! ## Error precedence
//!
//! When several steps fail, the caller sees the first failure: an engine or
//! routine error beats a resume error, which beats a detach error. The
//! shadowed errors are logged.

mod claim;
pub mod guards;

use std::fmt;

use claim::InstanceClaim;
use guards::{AttachGuard, SuspendGuard};

use crate::config::RebasedConfiguration;
use crate::control::ProcessControl;
use crate::engine::EngineFactory;
use crate::error::{BoxError, DataminerError, DataminerResult};
use crate::types::RunningInstance;

/// Lifecycle state of a [`ProcessSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState
{
    Unattached,
    Attached,
    Suspended,
    Active,
    Resumed,
    Closed,
}

impl fmt::Display for SessionState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            SessionState::Unattached => "unattached",
            SessionState::Attached => "attached",
            SessionState::Suspended => "suspended",
            SessionState::Active => "active",
            SessionState::Resumed => "resumed",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A one-shot session over a running instance
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use dataminer_core::config::RebasedConfiguration;
/// use dataminer_core::control::{create_process_control, ProcessMemory};
/// use dataminer_core::engine::EngineFactory;
/// use dataminer_core::error::DataminerResult;
/// use dataminer_core::session::ProcessSession;
/// # use dataminer_core::types::RunningInstance;
///
/// struct Raw;
///
/// impl EngineFactory for Raw
/// {
///     type Engine = Arc<dyn ProcessMemory>;
///
///     fn create(&self, memory: Arc<dyn ProcessMemory>, _: &RebasedConfiguration) -> DataminerResult<Self::Engine>
///     {
///         Ok(memory)
///     }
/// }
///
/// # fn run(instance: RunningInstance, config: RebasedConfiguration) -> DataminerResult<()> {
/// let mut control = create_process_control()?;
/// let base = config.load_base();
/// let mut session = ProcessSession::new(control.as_mut(), instance, config);
/// let header = session.run(&Raw, |memory| Ok(memory.read_memory(base, 2)?))?;
/// assert_eq!(header, b"MZ");
/// # Ok(())
/// # }
/// ```
pub struct ProcessSession<'c>
{
    control: &'c mut dyn ProcessControl,
    instance: RunningInstance,
    config: RebasedConfiguration,
    state: SessionState,
}

impl<'c> ProcessSession<'c>
{
    /// Create an unattached session
    ///
    /// `config` must already be rebased against `instance`'s main module.
    pub fn new(control: &'c mut dyn ProcessControl, instance: RunningInstance, config: RebasedConfiguration) -> Self
    {
        Self {
            control,
            instance,
            config,
            state: SessionState::Unattached,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState
    {
        self.state
    }

    /// The instance this session targets
    pub fn instance(&self) -> &RunningInstance
    {
        &self.instance
    }

    /// The rebased configuration handed to the engine factory
    pub fn config(&self) -> &RebasedConfiguration
    {
        &self.config
    }

    /// Run the full cycle with one extraction routine.
    ///
    /// The routine runs at most once, while the target is suspended. By the
    /// time this returns, the target has been resumed and released whenever
    /// it was attached.
    ///
    /// ## Errors
    ///
    /// - `SessionClosed`: the session has already run
    /// - `InstanceBusy`: another session in this process owns the instance
    /// - `ProcessNotFound` / `PermissionDenied` / `AttachFailed`: attach failed
    /// - `ThreadEnumerationFailed` / `SuspendFailed`: suspension failed; any
    ///   partially suspended threads have been resumed
    /// - Any engine factory error
    /// - `Extraction`: the routine failed
    /// - `ResumeFailed` / `DetachFailed`: teardown failed after an otherwise
    ///   successful run
    pub fn run<F, T, R>(&mut self, factory: &F, routine: R) -> DataminerResult<T>
    where
        F: EngineFactory + ?Sized,
        R: FnOnce(&mut F::Engine) -> Result<T, BoxError>,
    {
        let pid = self.instance.pid;
        if self.state != SessionState::Unattached {
            return Err(DataminerError::SessionClosed(pid));
        }

        let span = tracing::info_span!("session", %pid, build = %self.instance.build);
        let _enter = span.enter();

        let result = match InstanceClaim::acquire(pid) {
            Ok(claim) => {
                let result = self.run_claimed(factory, routine);
                drop(claim);
                result
            }
            Err(e) => Err(e),
        };
        self.state = SessionState::Closed;

        match &result {
            Ok(_) => tracing::info!("Session completed"),
            Err(e) => tracing::error!(error = %e, "Session failed"),
        }
        result
    }

    fn run_claimed<F, T, R>(&mut self, factory: &F, routine: R) -> DataminerResult<T>
    where
        F: EngineFactory + ?Sized,
        R: FnOnce(&mut F::Engine) -> Result<T, BoxError>,
    {
        let pid = self.instance.pid;
        let state = &mut self.state;
        let config = &self.config;

        let mut attached = AttachGuard::attach(&mut *self.control, pid)?;
        transition(state, SessionState::Attached);

        let (outcome, resumed) = suspend_and_dispatch(&mut attached, factory, config, routine, state);
        let detached = attached.detach();

        match (outcome, resumed, detached) {
            (Err(e), resumed, detached) => {
                shadow("resume", resumed);
                shadow("detach", detached);
                Err(e)
            }
            (Ok(_), Err(e), detached) => {
                shadow("detach", detached);
                Err(e)
            }
            (Ok(_), Ok(()), Err(e)) => Err(e),
            (Ok(value), Ok(()), Ok(())) => Ok(value),
        }
    }
}

/// Suspend, dispatch and resume; returns the dispatch outcome and the resume result
fn suspend_and_dispatch<F, T, R>(
    attached: &mut AttachGuard<'_>,
    factory: &F,
    config: &RebasedConfiguration,
    routine: R,
    state: &mut SessionState,
) -> (DataminerResult<T>, DataminerResult<()>)
where
    F: EngineFactory + ?Sized,
    R: FnOnce(&mut F::Engine) -> Result<T, BoxError>,
{
    // Partially suspended threads are already resumed by the guard
    let suspended = match SuspendGuard::suspend_all(attached.control()) {
        Ok(suspended) => suspended,
        Err(e) => return (Err(e), Ok(())),
    };
    transition(state, SessionState::Suspended);

    let outcome = dispatch(&suspended, factory, config, routine, state);

    let resumed = suspended.resume();
    transition(state, SessionState::Resumed);
    (outcome, resumed)
}

/// Build the engine and hand it to the routine; the engine is dropped before teardown
fn dispatch<F, T, R>(
    suspended: &SuspendGuard<'_>,
    factory: &F,
    config: &RebasedConfiguration,
    routine: R,
    state: &mut SessionState,
) -> DataminerResult<T>
where
    F: EngineFactory + ?Sized,
    R: FnOnce(&mut F::Engine) -> Result<T, BoxError>,
{
    let memory = suspended.memory()?;
    tracing::info!("Creating engine");
    let mut engine = factory.create(memory, config)?;
    transition(state, SessionState::Active);

    tracing::info!("Datamining");
    routine(&mut engine).map_err(DataminerError::Extraction)
}

fn transition(state: &mut SessionState, next: SessionState)
{
    let from = *state;
    tracing::debug!(%from, to = %next, "Session state");
    *state = next;
}

fn shadow(step: &str, result: DataminerResult<()>)
{
    if let Err(e) = result {
        tracing::error!(step, error = %e, "Teardown failed after an earlier error");
    }
}
