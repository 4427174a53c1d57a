//! # Engine Boundary
//!
//! The harness never walks the target's object graph itself. A caller-supplied
//! [`EngineFactory`] builds an engine once per session from the suspended
//! process's memory and the rebased configuration; the extraction routine
//! then receives that engine.
//!
//! [`ReflectionEngine`] is the capability contract extraction routines are
//! written against: class and path lookup, object enumeration, and typed
//! field reads. The dumpers in [`crate::routines`] are written against it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::RebasedConfiguration;
use crate::control::ProcessMemory;
use crate::error::DataminerResult;
use crate::types::Address;

/// Builds the engine handed to an extraction routine
///
/// Only ever called while every thread of the target is suspended.
pub trait EngineFactory
{
    /// Engine type produced for each session
    type Engine;

    /// Build an engine over the suspended process.
    ///
    /// ## Errors
    ///
    /// - `EngineFailed`: the engine could not be constructed (for example a
    ///   required global is missing from the configuration)
    /// - `MemoryAccess`: reading the target's memory failed
    fn create(&self, memory: Arc<dyn ProcessMemory>, config: &RebasedConfiguration) -> DataminerResult<Self::Engine>;
}

impl<F: EngineFactory + ?Sized> EngineFactory for &F
{
    type Engine = F::Engine;

    fn create(&self, memory: Arc<dyn ProcessMemory>, config: &RebasedConfiguration) -> DataminerResult<Self::Engine>
    {
        (**self).create(memory, config)
    }
}

/// A class object in the target's type system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassHandle(pub Address);

/// A live object in the target's object graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub Address);

impl ObjectHandle
{
    /// Address of the object in the target process
    pub fn address(self) -> Address
    {
        self.0
    }
}

impl fmt::Display for ObjectHandle
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "object@{}", self.0)
    }
}

/// Value of an object field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue
{
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Interned name
    Name(String),
    /// Object reference; `None` for a null reference
    Object(Option<ObjectHandle>),
    Array(Vec<FieldValue>),
    /// Inline struct, by member name
    Struct(BTreeMap<String, FieldValue>),
}

impl FieldValue
{
    pub fn as_bool(&self) -> Option<bool>
    {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64>
    {
        match self {
            FieldValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// String or name contents
    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            FieldValue::String(value) | FieldValue::Name(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectHandle>
    {
        match self {
            FieldValue::Object(value) => *value,
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]>
    {
        match self {
            FieldValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, FieldValue>>
    {
        match self {
            FieldValue::Struct(members) => Some(members),
            _ => None,
        }
    }
}

/// Lookup and traversal over the target's live object graph
pub trait ReflectionEngine
{
    /// Class by its qualified name, e.g. `WillowGame.ItemDefinition`
    fn lookup_class(&self, name: &str) -> Option<ClassHandle>;

    /// Object by its full path
    fn lookup_path(&self, path: &str) -> Option<ObjectHandle>;

    /// Every live object accepted by `predicate`
    fn lookup_objects(&self, predicate: &dyn Fn(&ObjectHandle) -> bool) -> Vec<ObjectHandle>;

    /// Whether `object` is an instance of `class` or one of its subclasses
    fn is_a(&self, object: &ObjectHandle, class: &ClassHandle) -> bool;

    /// Short name of an object
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess`: the name couldn't be read
    fn object_name(&self, object: &ObjectHandle) -> DataminerResult<String>;

    /// Full path of an object
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess`: the path couldn't be read
    fn object_path(&self, object: &ObjectHandle) -> DataminerResult<String>;

    /// Read a named field of an object
    ///
    /// ## Errors
    ///
    /// - `EngineFailed`: the object's class has no such field
    /// - `MemoryAccess`: the value couldn't be read
    fn read_field(&self, object: &ObjectHandle, field: &str) -> DataminerResult<FieldValue>;

    /// Instances of `class`, excluding class default objects, ordered by path
    ///
    /// ## Errors
    ///
    /// Whatever `object_name` or `object_path` report.
    fn instances_of(&self, class: &ClassHandle) -> DataminerResult<Vec<(String, ObjectHandle)>>
    {
        let mut instances = Vec::new();
        for object in self.lookup_objects(&|object| self.is_a(object, class)) {
            if self.object_name(&object)?.starts_with(DEFAULT_OBJECT_PREFIX) {
                continue;
            }
            instances.push((self.object_path(&object)?, object));
        }
        instances.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(instances)
    }
}

/// Name prefix of class default objects
pub const DEFAULT_OBJECT_PREFIX: &str = "Default__";
