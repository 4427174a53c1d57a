//! # Address Configuration
//!
//! Per-build tables of named static addresses, and the relocation of those
//! addresses against the base the main module is actually loaded at.
//!
//! Addresses in a configuration are captured against a *reference base*, the
//! load address of the executable on the machine the table was produced on.
//! Before any of them can be dereferenced in a live process they have to be
//! relocated:
//!
//! ```text
//! rebased = static_address - reference_base + actual_load_base
//! ```
//!
//! Relocation is only correct when applied exactly once. [`AddressConfiguration::rebase`]
//! consumes the configuration and returns a [`RebasedConfiguration`], which has
//! no way to be rebased again.
//!
//! ## Format
//!
//! ```json
//! {
//!   "reference_base": "0x400000",
//!   "addresses": { "GlobalObjects": "0x1fe0a10", "GlobalNames": "0x1fe09e0" },
//!   "offsets": { "UObject.Class": "0x58" }
//! }
//! ```
//!
//! Values may be `0x` hex strings, decimal strings or JSON integers. Offsets
//! are structure offsets and are carried through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DataminerError, DataminerResult, RebaseError};
use crate::types::{Address, ModuleInfo};

/// Named static addresses for one build of the target, not yet relocated
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AddressConfiguration
{
    #[serde(default)]
    reference_base: Option<Address>,
    #[serde(default)]
    addresses: BTreeMap<String, Address>,
    #[serde(default, deserialize_with = "deserialize_offsets")]
    offsets: BTreeMap<String, u64>,
}

impl AddressConfiguration
{
    /// Create a configuration from a reference base and a table of static addresses
    pub fn new(reference_base: Address, addresses: BTreeMap<String, Address>) -> Self
    {
        Self {
            reference_base: Some(reference_base),
            addresses,
            offsets: BTreeMap::new(),
        }
    }

    /// Attach structure offsets to the configuration
    #[must_use]
    pub fn with_offsets(mut self, offsets: BTreeMap<String, u64>) -> Self
    {
        self.offsets = offsets;
        self
    }

    /// Deserialize a registry blob
    ///
    /// `build` is only used to label the error.
    ///
    /// ## Errors
    ///
    /// - `InvalidConfiguration`: the blob isn't a valid configuration document
    pub fn from_json(build: &str, blob: &str) -> DataminerResult<Self>
    {
        serde_json::from_str(blob).map_err(|source| DataminerError::InvalidConfiguration {
            build: build.to_string(),
            source,
        })
    }

    /// The base the addresses were captured against
    pub fn reference_base(&self) -> Option<Address>
    {
        self.reference_base
    }

    /// Static (unrelocated) address of a named entry
    pub fn address(&self, name: &str) -> Option<Address>
    {
        self.addresses.get(name).copied()
    }

    /// All static addresses, ordered by name
    pub fn addresses(&self) -> &BTreeMap<String, Address>
    {
        &self.addresses
    }

    /// Structure offset of a named entry
    pub fn offset(&self, name: &str) -> Option<u64>
    {
        self.offsets.get(name).copied()
    }

    /// All structure offsets, ordered by name
    pub fn offsets(&self) -> &BTreeMap<String, u64>
    {
        &self.offsets
    }

    /// Relocate every address against the actual load base of `module`
    ///
    /// Consumes the configuration so that it cannot be relocated twice.
    ///
    /// ## Errors
    ///
    /// - `MissingReferenceBase`: the configuration has no (or a null) reference base
    /// - `ModuleUnavailable`: `module` isn't loaded
    /// - `OutOfRange`: a relocated address would leave the 64-bit address space
    ///
    /// ## Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    ///
    /// use dataminer_core::config::AddressConfiguration;
    /// use dataminer_core::types::{Address, ModuleInfo};
    ///
    /// let mut addresses = BTreeMap::new();
    /// addresses.insert("GlobalObjects".to_string(), Address::new(0x1fe0a10));
    /// let config = AddressConfiguration::new(Address::new(0x400000), addresses);
    ///
    /// let module = ModuleInfo::new("game.exe", "game.exe", Address::new(0x7ff6_0000_0000), 0x2000000);
    /// let rebased = config.rebase(&module)?;
    /// assert_eq!(rebased.address("GlobalObjects"), Some(Address::new(0x7ff6_01be_0a10)));
    /// # Ok::<(), dataminer_core::error::RebaseError>(())
    /// ```
    pub fn rebase(self, module: &ModuleInfo) -> Result<RebasedConfiguration, RebaseError>
    {
        let reference = self
            .reference_base
            .filter(|base| !base.is_null())
            .ok_or(RebaseError::MissingReferenceBase)?;
        if !module.is_loaded() {
            return Err(RebaseError::ModuleUnavailable(module.name.clone()));
        }
        let actual = module.base;

        let mut addresses = BTreeMap::new();
        for (name, address) in self.addresses {
            let relocated = i128::from(address.value()) - i128::from(reference.value()) + i128::from(actual.value());
            let relocated = u64::try_from(relocated).map_err(|_| RebaseError::OutOfRange {
                name: name.clone(),
                address,
                reference,
                actual,
            })?;
            addresses.insert(name, Address::new(relocated));
        }

        tracing::debug!(
            reference = %reference,
            actual = %actual,
            entries = addresses.len(),
            "Rebased address configuration"
        );

        Ok(RebasedConfiguration {
            reference_base: reference,
            load_base: actual,
            addresses,
            offsets: self.offsets,
        })
    }
}

/// Address configuration relocated against a live module
///
/// Only obtainable from [`AddressConfiguration::rebase`]; every address in it
/// is valid in the process the module belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebasedConfiguration
{
    reference_base: Address,
    load_base: Address,
    addresses: BTreeMap<String, Address>,
    offsets: BTreeMap<String, u64>,
}

impl RebasedConfiguration
{
    /// Base the static addresses were captured against
    pub fn reference_base(&self) -> Address
    {
        self.reference_base
    }

    /// Base the module is actually loaded at
    pub fn load_base(&self) -> Address
    {
        self.load_base
    }

    /// Relocated address of a named entry
    pub fn address(&self, name: &str) -> Option<Address>
    {
        self.addresses.get(name).copied()
    }

    /// Relocated address of a named entry that the caller cannot do without
    ///
    /// ## Errors
    ///
    /// - `EngineFailed`: no entry with that name
    pub fn require(&self, name: &str) -> DataminerResult<Address>
    {
        self.address(name)
            .ok_or_else(|| DataminerError::EngineFailed(format!("configuration has no address named {name}")))
    }

    /// All relocated addresses, ordered by name
    pub fn addresses(&self) -> &BTreeMap<String, Address>
    {
        &self.addresses
    }

    /// Structure offset of a named entry
    pub fn offset(&self, name: &str) -> Option<u64>
    {
        self.offsets.get(name).copied()
    }

    /// All structure offsets, ordered by name
    pub fn offsets(&self) -> &BTreeMap<String, u64>
    {
        &self.offsets
    }
}

fn deserialize_offsets<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Address>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(name, value)| (name, value.value())).collect())
}
