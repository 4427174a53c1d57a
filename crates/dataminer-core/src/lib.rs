//! # dataminer-core
//!
//! Attach to a running game process, freeze it, bind the address
//! configuration for its build, and hand a reflection engine to an
//! extraction routine; then resume and release the process, whatever the
//! routine did.
//!
//! ## Pipeline
//!
//! 1. [`locator`]: find running instances and their build identifiers
//! 2. [`resolver`]: pick the first instance whose build has a configuration in a [`registry`]
//! 3. [`config`]: relocate the configuration's static addresses against the live module
//! 4. [`session`]: attach, suspend every thread, build the engine, run the routine, resume, detach
//!
//! [`dataminer::Dataminer`] runs the whole pipeline in one call. The dumpers in
//! [`routines`] are ready-made extraction routines for any engine implementing
//! [`engine::ReflectionEngine`].
//!
//! ## Platform Support
//!
//! - **Linux**: `/proc` and `ptrace`, including games running under Wine/Proton
//! - **Windows**: ToolHelp snapshots, `OpenProcess` and `SuspendThread`
//!
//! ## Why unsafe code is needed
//!
//! Suspending another process's threads and reading its memory goes through
//! raw system calls (`ptrace`, `waitpid`, Win32). Those calls are wrapped in
//! safe abstractions in [`platform`]; everything else is safe Rust.

#![allow(unsafe_code)] // Required for ptrace and Win32 process APIs

pub mod config;
pub mod control;
pub mod dataminer;
pub mod dump;
pub mod engine;
pub mod error;
pub mod locator;
pub mod platform;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod routines;
pub mod session;
pub mod types;
pub mod version;

pub use control::{create_discovery, create_process_control, ProcessControl, ProcessMemory};
pub use dataminer::{Dataminer, RunOutcome};
// Re-export commonly used types
pub use error::{DataminerError, DataminerResult};
pub use types::{Address, ProcessId, RunningInstance};
