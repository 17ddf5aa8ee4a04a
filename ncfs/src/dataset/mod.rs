//! Dataset collaborator seam
//!
//! Responsibilities:
//! - Define the `DatasetStore` trait: the complete surface the filesystem
//!   engine consumes (variables, attributes at variable and dataset scope,
//!   dimensions, renames, creation, revision stamp).
//! - Provide the in-memory implementation used by tests and by the snapshot
//!   loader.
//!
//! Submodules:
//! - `memory`: insertion-ordered in-memory store
//! - `snapshot`: JSON snapshot model and load/save

pub mod memory;
pub mod snapshot;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryDataset;
pub use snapshot::{DatasetSnapshot, SnapshotError};

/// An attribute value, textual or numeric. Edits through the filesystem
/// always store text; numeric values come from snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("no such variable: {0}")]
    NoSuchVariable(String),
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),
    #[error("no such dimension: {0}")]
    NoSuchDimension(String),
    #[error("name already in use: {0}")]
    NameInUse(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("data length {got} does not match shape ({want})")]
    ShapeMismatch { want: usize, got: usize },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// The storage engine behind the virtual filesystem. Every operation is a
/// single atomic call; the engine performs no caching on top of it.
///
/// Renaming a dimension must keep the dimension tuples of all variables
/// referencing it in sync. It does NOT rename a same-named coordinate
/// variable; that coupling belongs to the filesystem engine.
pub trait DatasetStore {
    fn variable_names(&self) -> Vec<String>;
    fn has_variable(&self, name: &str) -> bool;
    /// Ordered dimension-name tuple of a variable.
    fn variable_dimensions(&self, name: &str) -> Option<Vec<String>>;
    /// Row-major flattened contents of a variable.
    fn variable_data(&self, name: &str) -> Option<Vec<f64>>;
    fn create_variable(&mut self, name: &str, dimensions: &[&str]) -> DatasetResult<()>;
    fn rename_variable(&mut self, old: &str, new: &str) -> DatasetResult<()>;

    fn variable_attr_names(&self, name: &str) -> Option<Vec<String>>;
    fn variable_attr(&self, name: &str, attr: &str) -> Option<AttrValue>;
    /// Creates the attribute when absent.
    fn set_variable_attr(&mut self, name: &str, attr: &str, value: AttrValue) -> DatasetResult<()>;
    fn remove_variable_attr(&mut self, name: &str, attr: &str) -> DatasetResult<()>;
    fn rename_variable_attr(&mut self, name: &str, old: &str, new: &str) -> DatasetResult<()>;

    fn global_attr_names(&self) -> Vec<String>;
    fn global_attr(&self, name: &str) -> Option<AttrValue>;
    /// Creates the attribute when absent.
    fn set_global_attr(&mut self, name: &str, value: AttrValue) -> DatasetResult<()>;
    fn remove_global_attr(&mut self, name: &str) -> DatasetResult<()>;
    fn rename_global_attr(&mut self, old: &str, new: &str) -> DatasetResult<()>;

    fn dimension_names(&self) -> Vec<String>;
    fn has_dimension(&self, name: &str) -> bool;
    fn dimension_size(&self, name: &str) -> Option<usize>;
    fn create_dimension(&mut self, name: &str, size: usize) -> DatasetResult<()>;
    fn rename_dimension(&mut self, old: &str, new: &str) -> DatasetResult<()>;

    /// Monotonic stamp bumped by every mutation. Used as a cache key by the
    /// representation codecs so encoded bytes never outlive a write.
    fn revision(&self) -> u64;
}
