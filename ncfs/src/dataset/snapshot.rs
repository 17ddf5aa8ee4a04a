//! JSON snapshot of a dataset: loaded once at mount, written back once at
//! unmount. The snapshot file is the only persisted state.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AttrValue, DatasetError, DatasetStore, InMemoryDataset};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot parse: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot invalid: {0}")]
    Invalid(#[from] DatasetError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttrSpec {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// Row-major flattened contents; empty means all zeros.
    #[serde(default)]
    pub data: Vec<f64>,
    #[serde(default)]
    pub attributes: Vec<AttrSpec>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub attributes: Vec<AttrSpec>,
}

impl InMemoryDataset {
    pub fn from_snapshot(snapshot: DatasetSnapshot) -> Result<Self, SnapshotError> {
        let mut ds = InMemoryDataset::new();
        for dim in &snapshot.dimensions {
            ds.create_dimension(&dim.name, dim.size)?;
        }
        for var in snapshot.variables {
            let dims: Vec<&str> = var.dimensions.iter().map(String::as_str).collect();
            ds.create_variable(&var.name, &dims)?;
            if !var.data.is_empty() {
                ds.set_variable_data(&var.name, var.data)?;
            }
            for attr in var.attributes {
                ds.set_variable_attr(&var.name, &attr.name, attr.value)?;
            }
        }
        for attr in snapshot.attributes {
            ds.set_global_attr(&attr.name, attr.value)?;
        }
        Ok(ds)
    }

    pub fn to_snapshot(&self) -> DatasetSnapshot {
        DatasetSnapshot {
            dimensions: self
                .dimension_names()
                .into_iter()
                .map(|name| {
                    let size = self.dimension_size(&name).unwrap_or(0);
                    DimensionSpec { name, size }
                })
                .collect(),
            variables: self
                .variable_names()
                .into_iter()
                .map(|name| VariableSpec {
                    dimensions: self.variable_dimensions(&name).unwrap_or_default(),
                    data: self.variable_data(&name).unwrap_or_default(),
                    attributes: self
                        .variable_attr_names(&name)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|attr| AttrSpec {
                            value: self.variable_attr(&name, &attr).unwrap_or_else(|| {
                                AttrValue::Text(String::new())
                            }),
                            name: attr,
                        })
                        .collect(),
                    name,
                })
                .collect(),
            attributes: self
                .global_attr_names()
                .into_iter()
                .map(|name| AttrSpec {
                    value: self
                        .global_attr(&name)
                        .unwrap_or_else(|| AttrValue::Text(String::new())),
                    name,
                })
                .collect(),
        }
    }

    /// Open a snapshot file for the lifetime of a mount.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let snapshot: DatasetSnapshot = serde_json::from_reader(BufReader::new(file))?;
        Self::from_snapshot(snapshot)
    }

    /// Write the live dataset back; called exactly once at unmount.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_snapshot())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
