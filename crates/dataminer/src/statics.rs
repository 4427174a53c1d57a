//! Engine behind the `statics` command.
//!
//! Reads the pointer-sized value stored at every configured static address
//! of the suspended process. Useful for checking that a configuration lines
//! up with a build before running heavier extraction.

use std::collections::BTreeMap;
use std::sync::Arc;

use dataminer_core::config::RebasedConfiguration;
use dataminer_core::engine::EngineFactory;
use dataminer_core::error::{DataminerError, DataminerResult};
use dataminer_core::types::Address;
use dataminer_core::ProcessMemory;
use dataminer_utils::warn;
use serde::Serialize;

/// Output file written by the `statics` command
pub const STATICS_DUMP: &str = "Statics.json";

/// Builds a [`StaticsEngine`] for a session
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticsFactory;

impl EngineFactory for StaticsFactory
{
    type Engine = StaticsEngine;

    fn create(&self, memory: Arc<dyn ProcessMemory>, config: &RebasedConfiguration) -> DataminerResult<StaticsEngine>
    {
        if config.addresses().is_empty() {
            return Err(DataminerError::EngineFailed(
                "configuration has no static addresses".to_string(),
            ));
        }
        Ok(StaticsEngine {
            memory,
            config: config.clone(),
        })
    }
}

/// One row of `Statics.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticValue
{
    /// Rebased address of the static
    pub address: Address,
    /// Pointer-sized value stored there
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct StaticsEngine
{
    memory: Arc<dyn ProcessMemory>,
    config: RebasedConfiguration,
}

impl StaticsEngine
{
    /// Read every configured static, ordered by name
    ///
    /// An unreadable address is recorded on its row rather than failing the
    /// whole dump.
    pub fn read_all(&self) -> BTreeMap<String, StaticValue>
    {
        self.config
            .addresses()
            .iter()
            .map(|(name, &address)| {
                let row = match self.memory.read_pointer(address) {
                    Ok(value) => StaticValue {
                        address,
                        value: Some(value),
                        error: None,
                    },
                    Err(e) => {
                        warn!(static_name = %name, %address, error = %e, "Unreadable static");
                        StaticValue {
                            address,
                            value: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                (name.clone(), row)
            })
            .collect()
    }
}
