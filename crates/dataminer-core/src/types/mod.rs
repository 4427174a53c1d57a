//! # Types
//!
//! Platform-agnostic types used throughout the harness.
//!
//! These types abstract away platform-specific details, allowing the rest of
//! the crate to work with concepts like "process ID" and "module base" without
//! knowing whether we're on Linux or Windows.

pub mod address;
pub mod process;

pub use address::Address;
pub use process::{ModuleInfo, ProcessEntry, ProcessId, RunningInstance, ThreadId};
