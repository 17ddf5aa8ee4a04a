//! The filesystem operation engine: path in, dataset effect out.
//!
//! Every operation re-resolves its path against the live dataset; the
//! engine keeps no copy of any value, so the dataset handle is the single
//! source of truth. One lock guards the handle for the whole of each
//! operation, which also makes the two-phase dimension rename a single
//! critical section.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;

use crate::dataset::{AttrValue, DatasetError, DatasetStore};
use crate::repr::{self, VardataCodec, attrs, dims};

use super::error::{FsError, FsResult};
use super::path::{PathKind, classify, exists};

/// Placeholder prefix used while dimensions move through a two-phase rename.
/// Never observable: the rename completes within one engine call.
const RESERVE_PREFIX: &str = "~ncfs~";

const DEFAULT_FILE_MODE: u32 = 0o100_644;
const TEMPLATE_SIZE: u64 = 4096;

/// Stat record of a virtual entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub size: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileStat {
    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }
}

/// Flip a regular-file mode to a directory mode, mirroring each read
/// permission into the matching execute bit so the directory is traversable.
fn make_into_dir(mut mode: u32) -> u32 {
    mode = (mode ^ libc::S_IFREG as u32) | libc::S_IFDIR as u32;
    for (read, exec) in [(0o400, 0o100), (0o40, 0o10), (0o4, 0o1)] {
        if mode & read != 0 {
            mode |= exec;
        }
    }
    mode
}

/// `current[..offset] + buf + current[offset + buf.len()..]` with slice
/// bounds clamped to the current length, so writes past the end append.
fn splice_bytes(current: &[u8], buf: &[u8], offset: usize) -> Vec<u8> {
    let start = offset.min(current.len());
    let end = (offset + buf.len()).min(current.len());
    let mut out = Vec::with_capacity(current.len().max(offset + buf.len()));
    out.extend_from_slice(&current[..start]);
    out.extend_from_slice(buf);
    out.extend_from_slice(&current[end..]);
    out
}

fn pad_or_cut(s: &str, len: usize) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    chars.resize(len, ' ');
    chars.into_iter().collect()
}

pub struct NcFs<D> {
    dataset: Arc<Mutex<D>>,
    vardata: Box<dyn VardataCodec>,
    mount_time: SystemTime,
    uid: u32,
    gid: u32,
}

impl<D: DatasetStore> NcFs<D> {
    pub fn new(dataset: D, vardata: Box<dyn VardataCodec>) -> Self {
        Self::with_shared(Arc::new(Mutex::new(dataset)), vardata)
    }

    /// Build over an externally held dataset handle, so the caller can save
    /// it back after unmount.
    pub fn with_shared(dataset: Arc<Mutex<D>>, vardata: Box<dyn VardataCodec>) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            dataset,
            vardata,
            mount_time: SystemTime::now(),
            uid,
            gid,
        }
    }

    fn file_template(&self) -> FileStat {
        FileStat {
            mode: DEFAULT_FILE_MODE,
            size: TEMPLATE_SIZE,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            atime: self.mount_time,
            mtime: self.mount_time,
            ctime: self.mount_time,
        }
    }

    pub fn getattr(&self, path: &str) -> FsResult<FileStat> {
        debug!("getattr: {path}");
        let ds = self.dataset.lock().unwrap();
        let kind = classify(&*ds, path);
        let mut st = self.file_template();
        match &kind {
            PathKind::Root => {
                st.mode = make_into_dir(st.mode);
            }
            PathKind::Blacklisted => {}
            k if !exists(&*ds, k) => return Err(FsError::NotFound),
            PathKind::VarDir(_) => {
                st.mode = make_into_dir(st.mode);
                st.size = TEMPLATE_SIZE;
            }
            PathKind::VarAttr(v, a) => {
                let value = ds.variable_attr(v, a).ok_or(FsError::NotFound)?;
                st.size = attrs::size(&value);
            }
            PathKind::GlobalAttr(n) => {
                let value = ds.global_attr(n).ok_or(FsError::NotFound)?;
                st.size = attrs::size(&value);
            }
            PathKind::VarData(v) => {
                let data = ds.variable_data(v).ok_or(FsError::NotFound)?;
                st.size = self.vardata.size(v, ds.revision(), &data);
            }
            PathKind::VarDims(v) => {
                let names = ds.variable_dimensions(v).ok_or(FsError::NotFound)?;
                st.size = dims::size(&names);
            }
            PathKind::Nonexistent => return Err(FsError::NotFound),
        }
        Ok(st)
    }

    /// Directory listing; `.` and `..` always lead. Non-directories get the
    /// bare dot entries (the adapter refuses them before this matters).
    pub fn readdir(&self, path: &str) -> Vec<String> {
        debug!("readdir: {path}");
        let ds = self.dataset.lock().unwrap();
        let mut entries = vec![".".to_string(), "..".to_string()];
        match classify(&*ds, path) {
            PathKind::Root => {
                entries.extend(ds.variable_names());
                entries.extend(ds.global_attr_names());
            }
            PathKind::VarDir(v) => {
                if let Some(attr_names) = ds.variable_attr_names(&v) {
                    entries.extend(attr_names);
                    entries.push(super::path::DATA_REPR.to_string());
                    entries.push(super::path::DIMENSIONS.to_string());
                }
            }
            _ => {}
        }
        entries
    }

    pub fn read(&self, path: &str, size: u32, offset: u64) -> FsResult<Bytes> {
        debug!("read: {path} ({size} bytes at {offset})");
        let ds = self.dataset.lock().unwrap();
        let encoded = match classify(&*ds, path) {
            PathKind::VarAttr(v, a) => {
                attrs::encode(&ds.variable_attr(&v, &a).ok_or(FsError::NotFound)?)
            }
            PathKind::GlobalAttr(n) => {
                attrs::encode(&ds.global_attr(&n).ok_or(FsError::NotFound)?)
            }
            PathKind::VarData(v) => {
                let data = ds.variable_data(&v).ok_or(FsError::NotFound)?;
                self.vardata.encode(&v, ds.revision(), &data)
            }
            PathKind::VarDims(v) => {
                dims::encode(&ds.variable_dimensions(&v).ok_or(FsError::NotFound)?)
            }
            _ => return Err(FsError::Internal(format!("read: unexpected path {path}"))),
        };
        Ok(repr::byte_range(&encoded, offset, size))
    }

    pub fn write(&self, path: &str, buf: &[u8], offset: u64) -> FsResult<u32> {
        debug!("write: {path} ({} bytes at {offset})", buf.len());
        let mut ds = self.dataset.lock().unwrap();
        match classify(&*ds, path) {
            PathKind::VarAttr(v, a) => {
                let current = ds.variable_attr(&v, &a).ok_or(FsError::NotFound)?;
                let value = spliced_attr_text(&current, buf, offset);
                ds.set_variable_attr(&v, &a, AttrValue::Text(value))?;
            }
            PathKind::GlobalAttr(n) => {
                let current = ds.global_attr(&n).ok_or(FsError::NotFound)?;
                let value = spliced_attr_text(&current, buf, offset);
                ds.set_global_attr(&n, AttrValue::Text(value))?;
            }
            PathKind::VarDims(v) => {
                let old = ds.variable_dimensions(&v).ok_or(FsError::NotFound)?;
                let encoded = dims::encode(&old);
                let edited = splice_bytes(&encoded, buf, offset as usize);
                let candidate = dims::decode(&String::from_utf8_lossy(&edited));
                match self.apply_dimension_edit(&mut *ds, &old, &candidate) {
                    // Editors write files in several passes; an inconsistent
                    // intermediate state reverts on the next read.
                    Err(FsError::InvalidEdit) => {
                        debug!("write: dimension edit on {path} rejected, keeping {old:?}");
                    }
                    other => other?,
                }
            }
            _ => {
                return Err(FsError::Internal(format!(
                    "write: unexpected path {path}"
                )));
            }
        }
        Ok(buf.len() as u32)
    }

    /// Validate and apply a candidate dimension-name tuple for one variable.
    ///
    /// Rejections (`InvalidEdit`) leave the dataset untouched: length
    /// mismatch, empty names, conflicting targets for a repeated dimension,
    /// or any duplicate in the dataset-wide dimension set after substitution.
    /// The apply path parks every affected dimension on a reserved name
    /// first, so swaps never collide; a dimension with a same-named
    /// coordinate variable carries that variable with it through both hops.
    fn apply_dimension_edit(
        &self,
        ds: &mut D,
        old: &[String],
        candidate: &[String],
    ) -> FsResult<()> {
        if candidate.len() != old.len() {
            return Err(FsError::InvalidEdit);
        }
        if candidate.iter().any(|n| n.is_empty()) {
            return Err(FsError::InvalidEdit);
        }
        let mut mapping: HashMap<&str, &str> = HashMap::new();
        for (o, n) in old.iter().zip(candidate) {
            if o == n {
                continue;
            }
            if let Some(prev) = mapping.insert(o.as_str(), n.as_str()) {
                if prev != n {
                    return Err(FsError::InvalidEdit);
                }
            }
        }
        if mapping.is_empty() {
            return Ok(());
        }
        // Simulate the substitution over the complete dimension set, not
        // just this variable's tuple: a collision anywhere rejects the edit.
        let mut seen = HashSet::new();
        for name in ds.dimension_names() {
            let target = mapping.get(name.as_str()).copied().unwrap_or(name.as_str());
            if !seen.insert(target.to_string()) {
                return Err(FsError::InvalidEdit);
            }
        }
        for o in mapping.keys() {
            rename_dimension_coupled(ds, o, &format!("{RESERVE_PREFIX}{o}"))
                .map_err(|e| FsError::Internal(format!("dimension rename: {e}")))?;
        }
        for (o, n) in &mapping {
            rename_dimension_coupled(ds, &format!("{RESERVE_PREFIX}{o}"), n)
                .map_err(|e| FsError::Internal(format!("dimension rename: {e}")))?;
        }
        Ok(())
    }

    pub fn create(&self, path: &str, mode: u32) -> FsResult<()> {
        debug!("create: {path} (mode {mode:o})");
        let mut ds = self.dataset.lock().unwrap();
        match classify(&*ds, path) {
            PathKind::VarAttr(v, a) => {
                if !ds.has_variable(&v) {
                    return Err(FsError::NotFound);
                }
                if ds.variable_attr(&v, &a).is_some() {
                    return Err(FsError::Unsupported);
                }
                ds.set_variable_attr(&v, &a, AttrValue::Text(String::new()))?;
            }
            PathKind::GlobalAttr(n) => {
                if ds.global_attr(&n).is_some() {
                    return Err(FsError::Unsupported);
                }
                ds.set_global_attr(&n, AttrValue::Text(String::new()))?;
            }
            _ => return Err(FsError::Unsupported),
        }
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        debug!("unlink: {path}");
        let mut ds = self.dataset.lock().unwrap();
        match classify(&*ds, path) {
            PathKind::VarAttr(v, a) => {
                if !ds.has_variable(&v) {
                    return Err(FsError::NotFound);
                }
                ds.remove_variable_attr(&v, &a)?;
            }
            PathKind::GlobalAttr(n) => {
                ds.remove_global_attr(&n)?;
            }
            // Deleting a whole variable is unsupported.
            PathKind::VarDir(_) => return Err(FsError::Unsupported),
            _ => {
                return Err(FsError::Internal(format!(
                    "unlink: unexpected path {path}"
                )));
            }
        }
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        debug!("rename: {old} -> {new}");
        let mut ds = self.dataset.lock().unwrap();
        let from = classify(&*ds, old);
        let to = classify(&*ds, new);
        match (from, to) {
            (PathKind::VarAttr(v1, a1), PathKind::VarAttr(v2, a2)) => {
                // Attributes only move within their own variable.
                if v1 != v2 {
                    return Err(FsError::Unsupported);
                }
                if !ds.has_variable(&v1) {
                    return Err(FsError::NotFound);
                }
                ds.rename_variable_attr(&v1, &a1, &a2)?;
            }
            (PathKind::VarDir(o), PathKind::GlobalAttr(n)) => {
                // A name may not be both a variable and a global attribute.
                if ds.global_attr(&n).is_some() {
                    return Err(FsError::Unsupported);
                }
                if ds.has_dimension(&o) && ds.has_dimension(&n) {
                    return Err(FsError::Unsupported);
                }
                ds.rename_variable(&o, &n)?;
                if ds.has_dimension(&o) {
                    // Coordinate variable: its dimension follows atomically.
                    ds.rename_dimension(&o, &n)
                        .map_err(|e| FsError::Internal(format!("coupled rename: {e}")))?;
                }
            }
            (PathKind::GlobalAttr(o), PathKind::GlobalAttr(n)) => {
                ds.rename_global_attr(&o, &n)?;
            }
            _ => return Err(FsError::Unsupported),
        }
        Ok(())
    }

    pub fn truncate(&self, path: &str, length: u64) -> FsResult<()> {
        debug!("truncate: {path} -> {length}");
        let mut ds = self.dataset.lock().unwrap();
        match classify(&*ds, path) {
            PathKind::VarAttr(v, a) => {
                let value = ds.variable_attr(&v, &a).ok_or(FsError::NotFound)?;
                let adjusted = pad_or_cut(&value.to_string(), length as usize);
                ds.set_variable_attr(&v, &a, AttrValue::Text(adjusted))?;
            }
            PathKind::GlobalAttr(n) => {
                let value = ds.global_attr(&n).ok_or(FsError::NotFound)?;
                let adjusted = pad_or_cut(&value.to_string(), length as usize);
                ds.set_global_attr(&n, AttrValue::Text(adjusted))?;
            }
            // Tools probe truncate before writing; everything else is a
            // documented no-op.
            _ => {}
        }
        Ok(())
    }

    /// Stateless open: no handle table, handle value is always 0.
    pub fn open(&self, path: &str, _flags: u32) -> FsResult<u64> {
        debug!("open: {path}");
        let ds = self.dataset.lock().unwrap();
        let kind = classify(&*ds, path);
        match kind {
            PathKind::Blacklisted => Ok(0),
            PathKind::Root | PathKind::VarDir(_) | PathKind::Nonexistent => Err(FsError::NotFound),
            k if exists(&*ds, &k) => Ok(0),
            _ => Err(FsError::NotFound),
        }
    }

    pub fn release(&self, path: &str) -> FsResult<()> {
        debug!("release: {path}");
        Ok(())
    }
}

/// The written text an attribute stores: splice into the encoded value,
/// then strip the trailing newline the on-disk form carries.
fn spliced_attr_text(current: &AttrValue, buf: &[u8], offset: u64) -> String {
    let encoded = attrs::encode(current);
    let spliced = splice_bytes(&encoded, buf, offset as usize);
    String::from_utf8_lossy(&spliced).trim_end().to_string()
}

fn rename_dimension_coupled<D: DatasetStore>(
    ds: &mut D,
    old: &str,
    new: &str,
) -> Result<(), DatasetError> {
    ds.rename_dimension(old, new)?;
    if ds.has_variable(old) {
        ds.rename_variable(old, new)?;
    }
    Ok(())
}
