//! # Extraction Routines
//!
//! Dumpers written against [`ReflectionEngine`]. Each one walks the live
//! object graph, collects a serializable model, and writes it into the dump
//! directory with [`crate::dump::write_json`].
//!
//! - [`player_classes`]: `Player Classes.json`
//! - [`outposts`]: `Emergency Teleport Outposts.json`
//! - [`items`]: `Weapon Types.json` and `Item Types.json`
//!
//! Every routine is generic over the engine, so any [`crate::engine::EngineFactory`]
//! whose engine implements [`ReflectionEngine`] can drive them:
//!
//! ```rust,ignore
//! dataminer.run(control.as_mut(), &factory, |engine| {
//!     Ok(routines::player_classes::dump_player_classes(engine, "dumps")?)
//! })?;
//! ```

use thiserror::Error;

use crate::engine::{ClassHandle, FieldValue, ObjectHandle, ReflectionEngine};
use crate::error::DataminerError;

pub mod items;
pub mod outposts;
pub mod player_classes;

/// Why a routine gave up on the object graph
#[derive(Error, Debug)]
pub enum RoutineError
{
    /// A class the routine walks is not loaded in the target
    #[error("class {0} is not loaded")]
    MissingClass(&'static str),

    /// A field held a different kind of value than the routine reads
    #[error("{owner}: field {field} is not {expected}")]
    UnexpectedValue
    {
        /// Path of the object (or description of the struct) holding the field
        owner: String,
        /// Field name
        field: String,
        /// What the routine expected
        expected: &'static str,
    },

    /// The graph contradicts itself, e.g. a part list naming another definition
    #[error("{owner}: {reason}")]
    Inconsistent
    {
        /// Path of the offending object
        owner: String,
        /// What didn't line up
        reason: String,
    },

    /// The engine failed to read the graph
    #[error(transparent)]
    Engine(#[from] DataminerError),
}

/// Convenience type alias for `Result<T, RoutineError>`
pub type RoutineResult<T> = Result<T, RoutineError>;

/// Look up a class the routine cannot run without
///
/// ## Errors
///
/// - `MissingClass`: the class isn't loaded
pub fn require_class<E: ReflectionEngine + ?Sized>(engine: &E, name: &'static str) -> RoutineResult<ClassHandle>
{
    engine.lookup_class(name).ok_or(RoutineError::MissingClass(name))
}

/// A graph value fields can be read from: an object or an inline struct
#[derive(Debug, Clone, Copy)]
pub struct Node<'v>
{
    owner: &'v str,
    value: NodeValue<'v>,
}

#[derive(Debug, Clone, Copy)]
enum NodeValue<'v>
{
    Object(ObjectHandle),
    Struct(&'v FieldValue),
}

impl<'v> Node<'v>
{
    /// An object, described by its path in error messages
    pub fn object(object: ObjectHandle, path: &'v str) -> Self
    {
        Self {
            owner: path,
            value: NodeValue::Object(object),
        }
    }

    /// An array element or field value; `None` for a null reference
    ///
    /// ## Errors
    ///
    /// - `UnexpectedValue`: `value` is neither an object reference nor a struct
    pub fn from_value(value: &'v FieldValue, owner: &'v str) -> RoutineResult<Option<Self>>
    {
        match value {
            FieldValue::Object(Some(object)) => Ok(Some(Self {
                owner,
                value: NodeValue::Object(*object),
            })),
            FieldValue::Object(None) => Ok(None),
            FieldValue::Struct(_) => Ok(Some(Self {
                owner,
                value: NodeValue::Struct(value),
            })),
            _ => Err(RoutineError::UnexpectedValue {
                owner: owner.to_string(),
                field: "<element>".to_string(),
                expected: "an object or struct",
            }),
        }
    }

    /// Raw value of a member
    ///
    /// ## Errors
    ///
    /// - `UnexpectedValue`: a struct has no such member
    /// - `Engine`: the engine couldn't read the field
    pub fn read<E: ReflectionEngine + ?Sized>(&self, engine: &E, field: &str) -> RoutineResult<FieldValue>
    {
        match self.value {
            NodeValue::Object(object) => Ok(engine.read_field(&object, field)?),
            NodeValue::Struct(value) => value
                .as_struct()
                .and_then(|members| members.get(field))
                .cloned()
                .ok_or_else(|| self.unexpected(field, "a member of this struct")),
        }
    }

    /// ## Errors
    ///
    /// As [`Node::read`], or `UnexpectedValue` if the member isn't a bool
    pub fn read_bool<E: ReflectionEngine + ?Sized>(&self, engine: &E, field: &str) -> RoutineResult<bool>
    {
        self.read(engine, field)?.as_bool().ok_or_else(|| self.unexpected(field, "a bool"))
    }

    /// String or name member
    ///
    /// ## Errors
    ///
    /// As [`Node::read`], or `UnexpectedValue` if the member isn't textual
    pub fn read_string<E: ReflectionEngine + ?Sized>(&self, engine: &E, field: &str) -> RoutineResult<String>
    {
        match self.read(engine, field)? {
            FieldValue::String(text) | FieldValue::Name(text) => Ok(text),
            _ => Err(self.unexpected(field, "a string")),
        }
    }

    /// Object reference member; `None` for a null reference
    ///
    /// ## Errors
    ///
    /// As [`Node::read`], or `UnexpectedValue` if the member isn't a reference
    pub fn read_object<E: ReflectionEngine + ?Sized>(&self, engine: &E, field: &str) -> RoutineResult<Option<ObjectHandle>>
    {
        match self.read(engine, field)? {
            FieldValue::Object(object) => Ok(object),
            _ => Err(self.unexpected(field, "an object reference")),
        }
    }

    /// Array member
    ///
    /// ## Errors
    ///
    /// As [`Node::read`], or `UnexpectedValue` if the member isn't an array
    pub fn read_array<E: ReflectionEngine + ?Sized>(&self, engine: &E, field: &str) -> RoutineResult<Vec<FieldValue>>
    {
        match self.read(engine, field)? {
            FieldValue::Array(values) => Ok(values),
            _ => Err(self.unexpected(field, "an array")),
        }
    }

    /// Path of the object or struct owning this node, for messages
    pub fn owner(&self) -> &'v str
    {
        self.owner
    }

    fn unexpected(&self, field: &str, expected: &'static str) -> RoutineError
    {
        RoutineError::UnexpectedValue {
            owner: self.owner.to_string(),
            field: field.to_string(),
            expected,
        }
    }
}

/// Label of an enumerated value.
///
/// Engines report enum fields either as the enumerator's name or as its
/// ordinal. Ordinals are looked up in `labels`; unknown ones fall back to the
/// number itself. Anything else yields `None`.
pub fn enum_label(value: &FieldValue, labels: &[&str]) -> Option<String>
{
    match value {
        FieldValue::Name(name) | FieldValue::String(name) => Some(name.clone()),
        FieldValue::Int(ordinal) => Some(
            usize::try_from(*ordinal)
                .ok()
                .and_then(|index| labels.get(index))
                .map_or_else(|| ordinal.to_string(), |label| (*label).to_string()),
        ),
        _ => None,
    }
}

/// Paths of the non-null references in `values`, sorted
///
/// ## Errors
///
/// - `UnexpectedValue`: an element isn't an object reference
/// - `Engine`: a path couldn't be read
pub fn sorted_paths<E: ReflectionEngine + ?Sized>(engine: &E, values: &[FieldValue], owner: &str) -> RoutineResult<Vec<String>>
{
    let mut paths = Vec::with_capacity(values.len());
    for value in values {
        match value {
            FieldValue::Object(Some(object)) => paths.push(engine.object_path(object)?),
            FieldValue::Object(None) => {}
            _ => {
                return Err(RoutineError::UnexpectedValue {
                    owner: owner.to_string(),
                    field: "<element>".to_string(),
                    expected: "an object reference",
                })
            }
        }
    }
    paths.sort();
    Ok(paths)
}
