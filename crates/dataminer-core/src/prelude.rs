//! Common module for library exports

pub use crate::config::{AddressConfiguration, RebasedConfiguration};
pub use crate::control::{create_discovery, create_process_control, ProcessControl, ProcessMemory};
pub use crate::dataminer::{CandidateReport, Dataminer, RunOutcome, DEFAULT_PROCESS_NAME};
pub use crate::engine::{ClassHandle, EngineFactory, FieldValue, ObjectHandle, ReflectionEngine};
pub use crate::error::{BoxError, DataminerError, DataminerResult, RebaseError};
pub use crate::locator::{ProcessDiscovery, ProcessLocator};
pub use crate::registry::{ConfigurationRegistry, DirectoryRegistry, MemoryRegistry};
pub use crate::routines::{RoutineError, RoutineResult};
pub use crate::session::{ProcessSession, SessionState};
pub use crate::types::{Address, ModuleInfo, ProcessEntry, ProcessId, RunningInstance, ThreadId};
