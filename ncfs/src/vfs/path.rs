//! Path classification: the deterministic map from a virtual path to the
//! dataset entity it denotes.

use crate::dataset::DatasetStore;

/// Synthetic file exposing a variable's array contents.
pub const DATA_REPR: &str = "DATA_REPR";
/// Synthetic file exposing a variable's ordered dimension names.
pub const DIMENSIONS: &str = "DIMENSIONS";
/// Sentinel segment of desktop trash folders; such paths are inert.
pub const TRASH_MARKER: &str = ".Trash";

/// Entity kind of a virtual path. Kinds are mutually exclusive; a top-level
/// name matching both a variable and a global attribute classifies as the
/// variable.
///
/// `VarAttr` and `GlobalAttr` are produced for candidate names too (so that
/// `create` has something to classify); [`exists`] answers whether the
/// entity is actually present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathKind {
    Root,
    Blacklisted,
    VarDir(String),
    VarData(String),
    VarDims(String),
    VarAttr(String, String),
    GlobalAttr(String),
    Nonexistent,
}

pub fn classify<D: DatasetStore>(ds: &D, path: &str) -> PathKind {
    if path == "/" {
        return PathKind::Root;
    }
    if path.contains(TRASH_MARKER) {
        return PathKind::Blacklisted;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => PathKind::Root,
        [name] => {
            if ds.has_variable(name) {
                PathKind::VarDir(name.to_string())
            } else {
                PathKind::GlobalAttr(name.to_string())
            }
        }
        [var, leaf] => {
            if *leaf == DATA_REPR {
                PathKind::VarData(var.to_string())
            } else if *leaf == DIMENSIONS {
                PathKind::VarDims(var.to_string())
            } else {
                PathKind::VarAttr(var.to_string(), leaf.to_string())
            }
        }
        _ => PathKind::Nonexistent,
    }
}

/// Whether the classified entity is present in the dataset.
pub fn exists<D: DatasetStore>(ds: &D, kind: &PathKind) -> bool {
    match kind {
        PathKind::Root | PathKind::Blacklisted => true,
        PathKind::VarDir(v) | PathKind::VarData(v) | PathKind::VarDims(v) => ds.has_variable(v),
        PathKind::VarAttr(v, a) => ds.variable_attr(v, a).is_some(),
        PathKind::GlobalAttr(n) => ds.global_attr(n).is_some(),
        PathKind::Nonexistent => false,
    }
}
