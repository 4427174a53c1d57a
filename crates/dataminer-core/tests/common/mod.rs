//! Shared fakes for the integration tests
//!
//! `FakeControl` records every call made to it so tests can assert on the
//! exact ordering of attach, suspend, resume and detach.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dataminer_core::config::RebasedConfiguration;
use dataminer_core::control::{ProcessControl, ProcessMemory};
use dataminer_core::engine::EngineFactory;
use dataminer_core::error::{DataminerError, DataminerResult};
use dataminer_core::locator::ProcessDiscovery;
use dataminer_core::types::{Address, ModuleInfo, ProcessEntry, ProcessId, RunningInstance, ThreadId};

pub const LOAD_BASE: u64 = 0x7ff6_0000_0000;
pub const REFERENCE_BASE: u64 = 0x40_0000;

/// Blob registered for build "124"
pub const CONFIG_124: &str = r#"{
    "reference_base": "0x400000",
    "addresses": {
        "GlobalNames": "0x1fe09e0",
        "GlobalObjects": "0x1fe0a10"
    },
    "offsets": { "UObject.Class": "0x58" }
}"#;

pub fn module(base: u64) -> ModuleInfo
{
    ModuleInfo::new(
        "BorderlandsGOTY.exe",
        PathBuf::from("/games/Borderlands GOTY Enhanced/Binaries/Win64/BorderlandsGOTY.exe"),
        Address::new(base),
        0x240_0000,
    )
}

pub fn instance(pid: u32, build: &str) -> RunningInstance
{
    RunningInstance::new(ProcessId(pid), build, module(LOAD_BASE))
}

pub fn rebased_config() -> RebasedConfiguration
{
    dataminer_core::config::AddressConfiguration::from_json("124", CONFIG_124)
        .unwrap()
        .rebase(&module(LOAD_BASE))
        .unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call
{
    Attach(ProcessId),
    Suspend(ThreadId),
    Resume(ThreadId),
    Detach,
}

/// Pointer-sized values keyed by address
#[derive(Debug, Default)]
pub struct FakeMemory
{
    values: Mutex<HashMap<Address, u64>>,
}

impl FakeMemory
{
    pub fn set(&self, address: Address, value: u64)
    {
        self.values.lock().unwrap().insert(address, value);
    }
}

impl ProcessMemory for FakeMemory
{
    fn read_memory(&self, address: Address, len: usize) -> DataminerResult<Vec<u8>>
    {
        let values = self.values.lock().unwrap();
        let value = values.get(&address).ok_or(DataminerError::MemoryAccess {
            address,
            len,
            reason: "unmapped".to_string(),
        })?;
        Ok(value.to_le_bytes()[..len.min(8)].to_vec())
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> DataminerResult<usize>
    {
        let mut bytes = [0u8; 8];
        let len = data.len().min(8);
        bytes[..len].copy_from_slice(&data[..len]);
        self.set(address, u64::from_le_bytes(bytes));
        Ok(len)
    }
}

/// Scriptable in-memory process controller
#[derive(Debug, Default)]
pub struct FakeControl
{
    pub calls: Vec<Call>,
    pub threads: Vec<ThreadId>,
    pub memory: Arc<FakeMemory>,
    /// Make `attach` fail
    pub fail_attach: bool,
    /// Make suspension of the thread at this index fail
    pub fail_suspend_at: Option<usize>,
    /// Start the second thread when the first one is suspended
    pub spawn_on_suspend: Option<(ThreadId, ThreadId)>,
    pub fail_resume: bool,
    pub fail_detach: bool,
    attached: Option<ProcessId>,
    suspended: HashSet<ThreadId>,
}

impl FakeControl
{
    /// A process with `count` threads, numbered from 1
    pub fn with_threads(count: u64) -> Self
    {
        Self {
            threads: (1..=count).map(ThreadId).collect(),
            ..Self::default()
        }
    }

    pub fn suspended(&self) -> usize
    {
        self.suspended.len()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize
    {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn resumes(&self) -> Vec<ThreadId>
    {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Resume(thread) => Some(*thread),
                _ => None,
            })
            .collect()
    }

    pub fn attaches(&self) -> usize
    {
        self.count(|call| matches!(call, Call::Attach(_)))
    }

    pub fn detaches(&self) -> usize
    {
        self.count(|call| matches!(call, Call::Detach))
    }

    /// Index of the first call matching `predicate`
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize>
    {
        self.calls.iter().position(predicate)
    }
}

impl ProcessControl for FakeControl
{
    fn attach(&mut self, pid: ProcessId) -> DataminerResult<()>
    {
        self.calls.push(Call::Attach(pid));
        if self.fail_attach {
            return Err(DataminerError::AttachFailed {
                pid,
                reason: "Failed to open process".to_string(),
            });
        }
        self.attached = Some(pid);
        Ok(())
    }

    fn threads(&self) -> DataminerResult<Vec<ThreadId>>
    {
        self.attached.ok_or(DataminerError::NotAttached)?;
        Ok(self.threads.clone())
    }

    fn suspend_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        self.calls.push(Call::Suspend(thread));
        let index = self.threads.iter().position(|t| *t == thread);
        if index.is_some() && index == self.fail_suspend_at {
            return Err(DataminerError::SuspendFailed {
                thread,
                suspended: 0,
                reason: "thread exited".to_string(),
            });
        }
        self.suspended.insert(thread);
        if let Some((parent, child)) = self.spawn_on_suspend {
            if parent == thread && !self.threads.contains(&child) {
                self.threads.push(child);
            }
        }
        Ok(())
    }

    fn resume_thread(&mut self, thread: ThreadId) -> DataminerResult<()>
    {
        self.calls.push(Call::Resume(thread));
        self.suspended.remove(&thread);
        if self.fail_resume {
            return Err(DataminerError::ResumeFailed {
                thread,
                reason: "resume refused".to_string(),
            });
        }
        Ok(())
    }

    fn memory(&self) -> DataminerResult<Arc<dyn ProcessMemory>>
    {
        self.attached.ok_or(DataminerError::NotAttached)?;
        let memory: Arc<dyn ProcessMemory> = self.memory.clone();
        Ok(memory)
    }

    fn detach(&mut self) -> DataminerResult<()>
    {
        self.calls.push(Call::Detach);
        let pid = self.attached.take().ok_or(DataminerError::NotAttached)?;
        if self.fail_detach {
            return Err(DataminerError::DetachFailed {
                pid,
                reason: "handle refused to close".to_string(),
            });
        }
        Ok(())
    }

    fn is_attached(&self) -> bool
    {
        self.attached.is_some()
    }

    fn pid(&self) -> Option<ProcessId>
    {
        self.attached
    }
}

/// Discovery backend returning a fixed process list
#[derive(Debug, Default)]
pub struct ScriptedDiscovery
{
    pub entries: Vec<ProcessEntry>,
    /// Product version per module path; a missing entry is an unreadable version
    pub versions: HashMap<PathBuf, String>,
    pub lookups: Cell<usize>,
}

/// Main module of a scripted process; each pid gets its own image path
fn module_of(pid: u32) -> ModuleInfo
{
    let mut module = module(LOAD_BASE);
    module.path = PathBuf::from(format!("/games/{pid}/BorderlandsGOTY.exe"));
    module
}

impl ScriptedDiscovery
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add a process with a loaded main module and a product version
    pub fn with(mut self, pid: u32, version: &str) -> Self
    {
        let module = module_of(pid);
        self.versions.insert(module.path.clone(), version.to_string());
        self.entries.push(ProcessEntry {
            pid: ProcessId(pid),
            name: "BorderlandsGOTY.exe".to_string(),
            main_module: Some(module),
        });
        self
    }

    /// Add a process whose main module could not be inspected
    pub fn with_uninspectable(mut self, pid: u32) -> Self
    {
        self.entries.push(ProcessEntry {
            pid: ProcessId(pid),
            name: "BorderlandsGOTY.exe".to_string(),
            main_module: None,
        });
        self
    }

    /// Add a process whose version resource can't be read
    pub fn with_unversioned(mut self, pid: u32) -> Self
    {
        self.entries.push(ProcessEntry {
            pid: ProcessId(pid),
            name: "BorderlandsGOTY.exe".to_string(),
            main_module: Some(module_of(pid)),
        });
        self
    }
}

impl ProcessDiscovery for ScriptedDiscovery
{
    fn processes_by_name(&self, _name: &str) -> DataminerResult<Vec<ProcessEntry>>
    {
        self.lookups.set(self.lookups.get() + 1);
        Ok(self.entries.clone())
    }

    fn product_version(&self, module: &ModuleInfo) -> DataminerResult<String>
    {
        self.versions
            .get(&module.path)
            .cloned()
            .ok_or_else(|| DataminerError::VersionResource("no version resource".to_string()))
    }
}

/// Engine handed to routines in tests
pub struct FakeEngine
{
    pub memory: Arc<dyn ProcessMemory>,
    pub config: RebasedConfiguration,
}

/// Factory that can be told to fail
#[derive(Debug, Default)]
pub struct FakeFactory
{
    pub fail: bool,
    pub created: Cell<usize>,
}

impl FakeFactory
{
    pub fn failing() -> Self
    {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl EngineFactory for FakeFactory
{
    type Engine = FakeEngine;

    fn create(&self, memory: Arc<dyn ProcessMemory>, config: &RebasedConfiguration) -> DataminerResult<FakeEngine>
    {
        self.created.set(self.created.get() + 1);
        if self.fail {
            return Err(DataminerError::EngineFailed("GlobalObjects is not an object array".to_string()));
        }
        Ok(FakeEngine {
            memory,
            config: config.clone(),
        })
    }
}
