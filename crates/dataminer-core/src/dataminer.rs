//! # Runner
//!
//! Ties discovery, configuration resolution, rebasing and the session
//! together into a single call that extraction tools make:
//!
//! ```text
//! find_candidates -> resolve -> rebase (once) -> ProcessSession::run
//! ```

use crate::config::RebasedConfiguration;
use crate::control::ProcessControl;
use crate::engine::EngineFactory;
use crate::error::{BoxError, DataminerResult};
use crate::locator::{ProcessDiscovery, ProcessLocator};
use crate::registry::ConfigurationRegistry;
use crate::resolver::resolve;
use crate::session::ProcessSession;
use crate::types::RunningInstance;

/// Image name of the target application
pub const DEFAULT_PROCESS_NAME: &str = "borderlandsgoty";

/// Result of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T>
{
    /// A session ran and the routine returned this value
    Completed(T),
    /// No running instance has a registered configuration; nothing was attached
    NoSuitableProcess,
}

impl<T> RunOutcome<T>
{
    /// The routine's value, if a session ran
    pub fn completed(self) -> Option<T>
    {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::NoSuitableProcess => None,
        }
    }
}

/// A located instance and whether a configuration exists for its build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport
{
    pub instance: RunningInstance,
    pub configured: bool,
}

/// Locates the target, binds its configuration and runs extraction sessions
///
/// ## Example
///
/// ```rust,no_run
/// use dataminer_core::control::{create_discovery, create_process_control};
/// use dataminer_core::dataminer::{Dataminer, RunOutcome};
/// use dataminer_core::registry::DirectoryRegistry;
/// # use dataminer_core::engine::EngineFactory;
/// # fn factory() -> &'static dyn EngineFactory<Engine = ()> { todo!() }
///
/// let discovery = create_discovery()?;
/// let dataminer = Dataminer::new(discovery.as_ref(), DirectoryRegistry::new("configs"));
/// let mut control = create_process_control()?;
///
/// match dataminer.run(control.as_mut(), &factory(), |_engine| Ok(()))? {
///     RunOutcome::Completed(()) => println!("done"),
///     RunOutcome::NoSuitableProcess => println!("nothing to do"),
/// }
/// # Ok::<(), dataminer_core::error::DataminerError>(())
/// ```
#[derive(Debug)]
pub struct Dataminer<D, R>
{
    locator: ProcessLocator<D>,
    registry: R,
    process_name: String,
}

impl<D: ProcessDiscovery, R: ConfigurationRegistry> Dataminer<D, R>
{
    /// Create a runner targeting [`DEFAULT_PROCESS_NAME`]
    pub fn new(discovery: D, registry: R) -> Self
    {
        Self {
            locator: ProcessLocator::new(discovery),
            registry,
            process_name: DEFAULT_PROCESS_NAME.to_string(),
        }
    }

    /// Target a different image name
    pub fn with_process_name(mut self, process_name: impl Into<String>) -> Self
    {
        self.process_name = process_name.into();
        self
    }

    pub fn process_name(&self) -> &str
    {
        &self.process_name
    }

    pub fn registry(&self) -> &R
    {
        &self.registry
    }

    /// Every located instance, tagged with whether its build is configured
    ///
    /// Read-only: nothing is attached.
    ///
    /// ## Errors
    ///
    /// Process enumeration or registry backend failures.
    pub fn candidates(&self) -> DataminerResult<Vec<CandidateReport>>
    {
        self.locator
            .find_candidates(&self.process_name)?
            .into_iter()
            .map(|instance| {
                let configured = self.registry.contains(&instance.build)?;
                Ok(CandidateReport { instance, configured })
            })
            .collect()
    }

    /// Locate, resolve and rebase, without attaching
    ///
    /// ## Errors
    ///
    /// - `InvalidConfiguration`: the matching blob doesn't parse
    /// - `Rebase`: the configuration can't be relocated against the instance
    /// - Process enumeration or registry backend failures
    pub fn prepare(&self) -> DataminerResult<Option<(RunningInstance, RebasedConfiguration)>>
    {
        let candidates = self.locator.find_candidates(&self.process_name)?;
        let Some((instance, config)) = resolve(candidates, &self.registry)? else {
            return Ok(None);
        };

        let rebased = config.rebase(&instance.main_module)?;
        Ok(Some((instance, rebased)))
    }

    /// Run one extraction routine against the first configured instance
    ///
    /// A discovery miss is [`RunOutcome::NoSuitableProcess`], not an error.
    ///
    /// ## Errors
    ///
    /// Everything [`Dataminer::prepare`] and [`ProcessSession::run`] report.
    pub fn run<F, T, Rt>(&self, control: &mut dyn ProcessControl, factory: &F, routine: Rt) -> DataminerResult<RunOutcome<T>>
    where
        F: EngineFactory + ?Sized,
        Rt: FnOnce(&mut F::Engine) -> Result<T, BoxError>,
    {
        let Some((instance, config)) = self.prepare()? else {
            tracing::info!(process_name = %self.process_name, "Failed to find a suitable running process");
            return Ok(RunOutcome::NoSuitableProcess);
        };

        let mut session = ProcessSession::new(control, instance, config);
        session.run(factory, routine).map(RunOutcome::Completed)
    }
}
