use std::collections::BTreeMap;
use std::fmt;

use crate::file::File;
use crate::task::{Cleanable, Task};

/// The mode in which a build invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Evaluate stale targets.
    Build,
    /// Remove the artifacts of targets.
    Clean,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Build => f.write_str("build"),
            Mode::Clean => f.write_str("clean"),
        }
    }
}

/// The value produced by resolving a name.
///
/// Resources flow both ways through the pipeline: producers receive their
/// dependencies as resources, and return a resource of their own. Tasks and
/// files are shared by reference, so cloning a resource never copies the
/// underlying work.
#[derive(Debug, Clone, Default)]
pub enum Resource {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    File(File),
    List(Vec<Resource>),
    Map(BTreeMap<String, Resource>),
    Task(Task),
}

impl Resource {
    /// Returns the task if this resource is actionable.
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Resource::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the cleanable capability of this resource, if it has one.
    pub fn as_cleanable(&self) -> Option<&dyn Cleanable> {
        match self {
            Resource::File(file) => Some(file),
            Resource::Task(task) => task.as_cleanable(),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Resource::File(file) => Some(file),
            Resource::Task(Task::File(task)) => Some(task.file()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Resource::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Resource::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Resource]> {
        match self {
            Resource::List(list) => Some(list),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::None => "none",
            Resource::Bool(_) => "bool",
            Resource::Int(_) => "int",
            Resource::Float(_) => "float",
            Resource::Text(_) => "text",
            Resource::File(_) => "file",
            Resource::List(_) => "list",
            Resource::Map(_) => "map",
            Resource::Task(_) => "task",
        }
    }

    /// Visits every leaf of this resource, descending into lists and maps.
    pub fn for_each_leaf(&self, f: &mut impl FnMut(&Resource)) {
        match self {
            Resource::List(list) => list.iter().for_each(|item| item.for_each_leaf(f)),
            Resource::Map(map) => map.values().for_each(|item| item.for_each_leaf(f)),
            leaf => f(leaf),
        }
    }
}

impl From<bool> for Resource {
    fn from(value: bool) -> Self {
        Resource::Bool(value)
    }
}

impl From<i64> for Resource {
    fn from(value: i64) -> Self {
        Resource::Int(value)
    }
}

impl From<f64> for Resource {
    fn from(value: f64) -> Self {
        Resource::Float(value)
    }
}

impl From<&str> for Resource {
    fn from(value: &str) -> Self {
        Resource::Text(value.to_string())
    }
}

impl From<String> for Resource {
    fn from(value: String) -> Self {
        Resource::Text(value)
    }
}

impl From<File> for Resource {
    fn from(value: File) -> Self {
        Resource::File(value)
    }
}

impl From<Task> for Resource {
    fn from(value: Task) -> Self {
        Resource::Task(value)
    }
}

impl<T: Into<Resource>> From<Vec<T>> for Resource {
    fn from(value: Vec<T>) -> Self {
        Resource::List(value.into_iter().map(Into::into).collect())
    }
}
