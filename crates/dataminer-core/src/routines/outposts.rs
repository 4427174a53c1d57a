//! `Emergency Teleport Outposts.json`: fast travel and respawn stations.
//!
//! Every outpost lookup except the master list is written, keyed by path.
//! The master list (referenced from the single `WillowGlobals` object)
//! carries every station in the game; its order is the `sort_order` of each
//! outpost. DLC packages name the lookup they add, which becomes the
//! lookup's `dlc_package`.
//!
//! An outpost listed by more than one lookup is only written for the first
//! lookup in path order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::{enum_label, require_class, Node, RoutineError, RoutineResult};
use crate::dump::write_json;
use crate::engine::ReflectionEngine;

pub const OUTPOSTS_DUMP: &str = "Emergency Teleport Outposts.json";

const OUTPOST_LOOKUP: &str = "WillowGame.EmergencyTeleportOutpostLookup";
const WILLOW_GLOBALS: &str = "WillowGame.WillowGlobals";
const DLC_PACKAGE: &str = "WillowGame.DLCPackageDefinition";

/// Mission status labels by ordinal
pub const MISSION_STATUS: &[&str] = &[
    "NotStarted",
    "Active",
    "RequiredObjectivesComplete",
    "ReadyToTurnIn",
    "Complete",
    "Failed",
];

/// One outpost lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutpostLookup
{
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlc_package: Option<String>,
    pub outposts: Vec<Outpost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outpost
{
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_initially_active: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_checkpoint_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_outpost: Option<String>,
    #[serde(skip_serializing_if = "MissionDependencies::is_empty")]
    pub mission_dependencies: MissionDependencies,
    /// Position in the master list
    pub sort_order: usize,
}

/// Mission path to required status, in the order the outpost lists them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionDependencies(pub Vec<(String, String)>);

impl MissionDependencies
{
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }
}

impl Serialize for MissionDependencies
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (mission, status) in &self.0 {
            map.serialize_entry(mission, status)?;
        }
        map.end()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde passes fields by reference
fn is_false(value: &bool) -> bool
{
    !*value
}

/// Outpost lookups by path
///
/// ## Errors
///
/// - `MissingClass`: one of the lookup, globals or DLC package classes isn't loaded
/// - `Inconsistent`: there isn't exactly one globals object, it has no master
///   list, or an outpost is missing from the master list
/// - `UnexpectedValue`: a field has the wrong shape
/// - `Engine`: reading the graph failed
pub fn collect_outposts<E: ReflectionEngine + ?Sized>(engine: &E) -> RoutineResult<BTreeMap<String, OutpostLookup>>
{
    let lookup_class = require_class(engine, OUTPOST_LOOKUP)?;
    let globals_class = require_class(engine, WILLOW_GLOBALS)?;
    let package_class = require_class(engine, DLC_PACKAGE)?;

    let globals = engine.instances_of(&globals_class)?;
    let [(globals_path, globals)] = globals.as_slice() else {
        return Err(RoutineError::Inconsistent {
            owner: WILLOW_GLOBALS.to_string(),
            reason: format!("expected exactly one instance, found {}", globals.len()),
        });
    };
    let master = Node::object(*globals, globals_path)
        .read_object(engine, "MasterRegistrationStationList")?
        .ok_or_else(|| RoutineError::Inconsistent {
            owner: globals_path.clone(),
            reason: "no master registration station list".to_string(),
        })?;
    let master_path = engine.object_path(&master)?;

    let mut order = Vec::new();
    for entry in Node::object(master, &master_path).read_array(engine, "OutpostLookupList")? {
        if let Some(entry) = Node::from_value(&entry, &master_path)? {
            order.push(entry.read_string(engine, "OutpostName")?);
        }
    }
    let position = |name: &str| order.iter().position(|candidate| candidate == name);

    let mut sources = HashMap::new();
    for (package_path, package) in engine.instances_of(&package_class)? {
        let Some(lookup) = Node::object(package, &package_path).read_object(engine, "TeleportLookupObject")? else {
            tracing::debug!(package = %package_path, "DLC package adds no outposts");
            continue;
        };
        sources.entry(engine.object_path(&lookup)?).or_insert(package_path);
    }

    let mut written = HashSet::new();
    let mut lookups = BTreeMap::new();
    for (path, lookup) in engine.instances_of(&lookup_class)? {
        if lookup == master {
            continue;
        }

        let entries = Node::object(lookup, &path).read_array(engine, "OutpostLookupList")?;

        let mut named = Vec::with_capacity(entries.len());
        for value in &entries {
            if let Some(entry) = Node::from_value(value, &path)? {
                let name = entry.read_string(engine, "OutpostName")?;
                named.push((position(&name), name, entry));
            }
        }
        // Outposts missing from the master list sort first, then fail below
        named.sort_by_key(|(index, ..)| *index);

        let mut outposts = Vec::with_capacity(named.len());
        for (index, name, entry) in named {
            if !written.insert(name.clone()) {
                tracing::warn!(lookup = %path, outpost = %name, "Skipping duplicate outpost");
                continue;
            }
            let sort_order = index.ok_or_else(|| RoutineError::Inconsistent {
                owner: path.clone(),
                reason: format!("outpost {name} is not in the master list"),
            })?;
            outposts.push(read_outpost(engine, &entry, name, sort_order)?);
        }

        let dlc_package = sources.get(&path).filter(|source| source.as_str() != "None").cloned();
        tracing::debug!(lookup = %path, outposts = outposts.len(), "Outpost lookup");
        lookups.insert(path, OutpostLookup { dlc_package, outposts });
    }

    tracing::info!(lookups = lookups.len(), outposts = written.len(), "Collected outposts");
    Ok(lookups)
}

fn read_outpost<E: ReflectionEngine + ?Sized>(engine: &E, entry: &Node<'_>, name: String, sort_order: usize) -> RoutineResult<Outpost>
{
    let non_empty = |text: String, placeholder: &str| (!text.is_empty() && text != placeholder).then_some(text);

    let mut dependencies = Vec::new();
    for value in entry.read_array(engine, "MissionDependencies")? {
        let Some(dependency) = Node::from_value(&value, entry.owner())? else {
            continue;
        };
        let Some(mission) = dependency.read_object(engine, "MissionDefinition")? else {
            return Err(RoutineError::Inconsistent {
                owner: entry.owner().to_string(),
                reason: format!("outpost {name} depends on a null mission"),
            });
        };
        let status = dependency.read(engine, "MissionStatus")?;
        let status = enum_label(&status, MISSION_STATUS).ok_or_else(|| RoutineError::UnexpectedValue {
            owner: entry.owner().to_string(),
            field: "MissionStatus".to_string(),
            expected: "an enumerated value",
        })?;
        dependencies.push((engine.object_path(&mission)?, status));
    }

    Ok(Outpost {
        path: entry.read_string(engine, "OutpostPathName")?,
        is_initially_active: entry.read_bool(engine, "bInitiallyActive")?,
        is_checkpoint_only: entry.read_bool(engine, "bCheckpointOnly")?,
        display_name: non_empty(entry.read_string(engine, "OutpostDisplayName")?, ""),
        description: non_empty(entry.read_string(engine, "OutpostDescription")?, "No Description"),
        previous_outpost: non_empty(entry.read_string(engine, "PreviousOutpost")?, "None"),
        mission_dependencies: MissionDependencies(dependencies),
        name,
        sort_order,
    })
}

/// Collect the outpost lookups and write them into `dir`
///
/// ## Errors
///
/// Whatever [`collect_outposts`] reports, or `Engine(Io)` if the dump
/// couldn't be written.
pub fn dump_outposts<E: ReflectionEngine + ?Sized>(engine: &E, dir: impl AsRef<Path>) -> RoutineResult<PathBuf>
{
    let lookups = collect_outposts(engine)?;
    Ok(write_json(dir, OUTPOSTS_DUMP, &lookups)?)
}

