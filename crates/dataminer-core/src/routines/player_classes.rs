//! `Player Classes.json`: every player class definition, keyed by path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{enum_label, require_class, Node, RoutineError, RoutineResult};
use crate::dump::write_json;
use crate::engine::ReflectionEngine;

pub const PLAYER_CLASSES_DUMP: &str = "Player Classes.json";

const PLAYER_CLASS_DEFINITION: &str = "WillowGame.PlayerClassDefinition";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerClass
{
    /// Character the class belongs to
    pub name: String,
}

/// Player classes by path, class default objects excluded
///
/// ## Errors
///
/// - `MissingClass`: player class definitions aren't loaded
/// - `UnexpectedValue`: a `CharacterName` isn't an enumerated value
/// - `Engine`: reading the graph failed
pub fn collect_player_classes<E: ReflectionEngine + ?Sized>(engine: &E) -> RoutineResult<BTreeMap<String, PlayerClass>>
{
    let class = require_class(engine, PLAYER_CLASS_DEFINITION)?;

    let mut classes = BTreeMap::new();
    for (path, object) in engine.instances_of(&class)? {
        let node = Node::object(object, &path);
        let name = enum_label(&node.read(engine, "CharacterName")?, &[]).ok_or_else(|| RoutineError::UnexpectedValue {
            owner: path.clone(),
            field: "CharacterName".to_string(),
            expected: "an enumerated value",
        })?;
        tracing::debug!(%path, %name, "Player class");
        classes.insert(path, PlayerClass { name });
    }

    tracing::info!(count = classes.len(), "Collected player classes");
    Ok(classes)
}

/// Collect the player classes and write them into `dir`
///
/// ## Errors
///
/// Whatever [`collect_player_classes`] reports, or `Engine(Io)` if the dump
/// couldn't be written.
pub fn dump_player_classes<E: ReflectionEngine + ?Sized>(engine: &E, dir: impl AsRef<Path>) -> RoutineResult<PathBuf>
{
    let classes = collect_player_classes(engine)?;
    Ok(write_json(dir, PLAYER_CLASSES_DUMP, &classes)?)
}
