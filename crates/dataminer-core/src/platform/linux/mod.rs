//! # Linux Implementation
//!
//! Covers native Linux targets and Windows games running under Wine/Proton,
//! whose processes are ordinary Linux processes with the `.exe` mapped in.

mod control;
mod discovery;
mod maps;

pub use control::LinuxProcessControl;
pub use discovery::LinuxDiscovery;
