//! FUSE adapter and request handling
//!
//! Translates kernel requests (inode + name) onto the path-based engine:
//! an internal inode table maps inodes to virtual paths, every operation
//! re-resolves through the engine, and typed engine failures become errnos
//! here. File handles are stateless (always 0).

pub mod mount;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyCreated, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
    ReplyXAttr,
};
use rfuse3::raw::{Filesystem, Request};
use rfuse3::{FileType, Result as FuseResult, SetAttr, Timestamp};

use crate::dataset::DatasetStore;
use crate::vfs::{FileStat, FsError, NcFs};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;
/// Fixed placeholder answering extended-attribute reads.
const XATTR_PLACEHOLDER: &[u8] = b"foo";

fn errno(e: FsError) -> libc::c_int {
    match e {
        FsError::NotFound => libc::ENOENT,
        FsError::PermissionDenied => libc::EACCES,
        FsError::Unsupported => libc::EOPNOTSUPP,
        // Recovered inside the engine; seeing it here is a dispatch bug.
        FsError::InvalidEdit => libc::EIO,
        FsError::Internal(msg) => {
            error!("internal error: {msg}");
            libc::EIO
        }
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn stat_to_attr(ino: u64, st: &FileStat) -> FileAttr {
    let kind = if st.is_dir() {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    FileAttr {
        ino,
        size: st.size,
        blocks: st.size.div_ceil(512),
        atime: Timestamp::from(st.atime),
        mtime: Timestamp::from(st.mtime),
        ctime: Timestamp::from(st.ctime),
        #[cfg(target_os = "macos")]
        crtime: Timestamp::from(st.ctime),
        kind,
        perm: (st.mode & 0o7777) as u16,
        nlink: st.nlink,
        uid: st.uid,
        gid: st.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

/// ino <-> path table. Inodes are allocated on first lookup and follow
/// their entry through renames.
struct InodeTable {
    paths: HashMap<u64, String>,
    inos: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inos = HashMap::new();
        paths.insert(ROOT_INO, "/".to_string());
        inos.insert("/".to_string(), ROOT_INO);
        Self {
            paths,
            inos,
            next: ROOT_INO + 1,
        }
    }

    fn get_or_insert(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inos.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.inos.insert(path.to_string(), ino);
        ino
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.paths.get(&ino).cloned()
    }

    fn ino_of(&self, path: &str) -> Option<u64> {
        self.inos.get(path).copied()
    }

    fn remove(&mut self, path: &str) {
        if let Some(ino) = self.inos.remove(path) {
            self.paths.remove(&ino);
        }
    }

    /// Move an entry and everything under it to a new path.
    fn rename(&mut self, old: &str, new: &str) {
        let old_prefix = format!("{old}/");
        let moved: Vec<(u64, String)> = self
            .paths
            .iter()
            .filter_map(|(&ino, path)| {
                if path == old {
                    Some((ino, new.to_string()))
                } else {
                    path.strip_prefix(&old_prefix)
                        .map(|rest| (ino, format!("{new}/{rest}")))
                }
            })
            .collect();
        for (ino, new_path) in moved {
            if let Some(prev) = self.paths.insert(ino, new_path.clone()) {
                self.inos.remove(&prev);
            }
            self.inos.insert(new_path, ino);
        }
    }
}

pub struct NcfsFuse<D> {
    engine: NcFs<D>,
    inodes: Mutex<InodeTable>,
}

impl<D: DatasetStore> NcfsFuse<D> {
    pub fn new(engine: NcFs<D>) -> Self {
        Self {
            engine,
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.lock().unwrap().path_of(ino)
    }

    fn parent_ino(&self, path: &str) -> u64 {
        self.inodes
            .lock()
            .unwrap()
            .ino_of(parent_path(path))
            .unwrap_or(ROOT_INO)
    }
}

impl<D> Filesystem for NcfsFuse<D>
where
    D: DatasetStore + Send + 'static,
{
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        let max_write = NonZeroU32::new(1024 * 1024).unwrap();
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {}

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        let Some(parent_path) = self.path_of(parent) else {
            return Err(libc::ENOENT.into());
        };
        let path = child_path(&parent_path, &name.to_string_lossy());
        let st = self.engine.getattr(&path).map_err(errno)?;
        let ino = self.inodes.lock().unwrap().get_or_insert(&path);
        Ok(ReplyEntry {
            ttl: TTL,
            attr: stat_to_attr(ino, &st),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let st = self.engine.getattr(&path).map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: stat_to_attr(ino, &st),
        })
    }

    // Only a size change has meaning here (truncate); mode/owner/time
    // updates are accepted as no-ops so editors and cp do not fail.
    async fn setattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        if let Some(size) = set_attr.size {
            self.engine.truncate(&path, size).map_err(errno)?;
        }
        let st = self.engine.getattr(&path).map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: stat_to_attr(ino, &st),
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let fh = self.engine.open(&path, flags).map_err(errno)?;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let st = self.engine.getattr(&path).map_err(errno)?;
        if !st.is_dir() {
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let data = self.engine.read(&path, size, offset).map_err(errno)?;
        Ok(ReplyData { data })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let written = self.engine.write(&path, data, offset).map_err(errno)?;
        Ok(ReplyWrite { written })
    }

    async fn create(
        &self,
        _req: Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _flags: u32,
    ) -> FuseResult<ReplyCreated> {
        let Some(parent_path) = self.path_of(parent) else {
            return Err(libc::ENOENT.into());
        };
        let path = child_path(&parent_path, &name.to_string_lossy());
        self.engine.create(&path, mode).map_err(errno)?;
        let st = self.engine.getattr(&path).map_err(errno)?;
        let ino = self.inodes.lock().unwrap().get_or_insert(&path);
        Ok(ReplyCreated {
            ttl: TTL,
            attr: stat_to_attr(ino, &st),
            generation: 0,
            fh: 0,
            flags: 0,
        })
    }

    async fn unlink(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<()> {
        let Some(parent_path) = self.path_of(parent) else {
            return Err(libc::ENOENT.into());
        };
        let path = child_path(&parent_path, &name.to_string_lossy());
        self.engine.unlink(&path).map_err(errno)?;
        self.inodes.lock().unwrap().remove(&path);
        Ok(())
    }

    async fn rename(
        &self,
        _req: Request,
        parent: u64,
        name: &OsStr,
        new_parent: u64,
        new_name: &OsStr,
    ) -> FuseResult<()> {
        let table = self.inodes.lock().unwrap();
        let (Some(old_parent), Some(new_parent)) =
            (table.path_of(parent), table.path_of(new_parent))
        else {
            return Err(libc::ENOENT.into());
        };
        drop(table);
        let old = child_path(&old_parent, &name.to_string_lossy());
        let new = child_path(&new_parent, &new_name.to_string_lossy());
        self.engine.rename(&old, &new).map_err(errno)?;
        self.inodes.lock().unwrap().rename(&old, &new);
        Ok(())
    }

    // The tree shape is fixed by the dataset: directories cannot be made
    // or removed through the mount.
    async fn mkdir(
        &self,
        _req: Request,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
    ) -> FuseResult<ReplyEntry> {
        Err(libc::EOPNOTSUPP.into())
    }

    async fn rmdir(&self, _req: Request, _parent: u64, _name: &OsStr) -> FuseResult<()> {
        Err(libc::EOPNOTSUPP.into())
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let st = self.engine.getattr(&path).map_err(errno)?;
        if !st.is_dir() {
            return Err(libc::ENOTDIR.into());
        }

        let names = self.engine.readdir(&path);
        let mut all: Vec<DirectoryEntry> = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let entry_offset = (i as i64) + 1;
            let entry = match name.as_str() {
                "." => DirectoryEntry {
                    inode: ino,
                    kind: FileType::Directory,
                    name: OsString::from("."),
                    offset: entry_offset,
                },
                ".." => DirectoryEntry {
                    inode: self.parent_ino(&path),
                    kind: FileType::Directory,
                    name: OsString::from(".."),
                    offset: entry_offset,
                },
                _ => {
                    let child = child_path(&path, name);
                    let Ok(cst) = self.engine.getattr(&child) else {
                        continue;
                    };
                    let cino = self.inodes.lock().unwrap().get_or_insert(&child);
                    DirectoryEntry {
                        inode: cino,
                        kind: if cst.is_dir() {
                            FileType::Directory
                        } else {
                            FileType::RegularFile
                        },
                        name: OsString::from(name.clone()),
                        offset: entry_offset,
                    }
                }
            };
            all.push(entry);
        }

        let start = if offset <= 0 { 0 } else { offset as usize };
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all[start..].to_vec()
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let Some(path) = self.path_of(ino) else {
            return Err(libc::ENOENT.into());
        };
        let st = self.engine.getattr(&path).map_err(errno)?;
        if !st.is_dir() {
            return Err(libc::ENOTDIR.into());
        }

        let names = self.engine.readdir(&path);
        let mut all: Vec<DirectoryEntryPlus> = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let entry_offset = (i as i64) + 1;
            let entry = match name.as_str() {
                "." => DirectoryEntryPlus {
                    inode: ino,
                    generation: 0,
                    kind: FileType::Directory,
                    name: OsString::from("."),
                    offset: entry_offset,
                    attr: stat_to_attr(ino, &st),
                    entry_ttl: TTL,
                    attr_ttl: TTL,
                },
                ".." => {
                    let pino = self.parent_ino(&path);
                    let Ok(pst) = self.engine.getattr(parent_path(&path)) else {
                        continue;
                    };
                    DirectoryEntryPlus {
                        inode: pino,
                        generation: 0,
                        kind: FileType::Directory,
                        name: OsString::from(".."),
                        offset: entry_offset,
                        attr: stat_to_attr(pino, &pst),
                        entry_ttl: TTL,
                        attr_ttl: TTL,
                    }
                }
                _ => {
                    let child = child_path(&path, name);
                    let Ok(cst) = self.engine.getattr(&child) else {
                        continue;
                    };
                    let cino = self.inodes.lock().unwrap().get_or_insert(&child);
                    DirectoryEntryPlus {
                        inode: cino,
                        generation: 0,
                        kind: if cst.is_dir() {
                            FileType::Directory
                        } else {
                            FileType::RegularFile
                        },
                        name: OsString::from(name.clone()),
                        offset: entry_offset,
                        attr: stat_to_attr(cino, &cst),
                        entry_ttl: TTL,
                        attr_ttl: TTL,
                    }
                }
            };
            all.push(entry);
        }

        let start = if offset == 0 { 0 } else { offset as usize };
        let slice = if start >= all.len() {
            Vec::new()
        } else {
            all[start..].to_vec()
        };
        let stream_iter = stream::iter(slice.into_iter().map(Ok));
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream_iter);
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        // Conservative constants: the tree is a projection, not a store.
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: u64::MAX,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    async fn getxattr(
        &self,
        _req: Request,
        _ino: u64,
        _name: &OsStr,
        size: u32,
    ) -> FuseResult<ReplyXAttr> {
        if size == 0 {
            Ok(ReplyXAttr::Size(XATTR_PLACEHOLDER.len() as u32))
        } else {
            Ok(ReplyXAttr::Data(XATTR_PLACEHOLDER.into()))
        }
    }

    async fn listxattr(&self, _req: Request, _ino: u64, size: u32) -> FuseResult<ReplyXAttr> {
        if size == 0 {
            Ok(ReplyXAttr::Size(0))
        } else {
            Ok(ReplyXAttr::Data(bytes::Bytes::new()))
        }
    }

    async fn setxattr(
        &self,
        _req: Request,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: u32,
        _position: u32,
    ) -> FuseResult<()> {
        Err(libc::EOPNOTSUPP.into())
    }

    async fn removexattr(&self, _req: Request, _ino: u64, _name: &OsStr) -> FuseResult<()> {
        Ok(())
    }

    async fn release(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        if let Some(path) = self.path_of(ino) {
            self.engine.release(&path).map_err(errno)?;
        }
        Ok(())
    }

    async fn flush(&self, _req: Request, _ino: u64, _fh: u64, _lock_owner: u64) -> FuseResult<()> {
        Ok(())
    }

    async fn fsync(&self, _req: Request, _ino: u64, _fh: u64, _datasync: bool) -> FuseResult<()> {
        Ok(())
    }

    async fn releasedir(&self, _req: Request, _ino: u64, _fh: u64, _flags: u32) -> FuseResult<()> {
        Ok(())
    }

    async fn fsyncdir(
        &self,
        _req: Request,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn forget(&self, _req: Request, _ino: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{AttrValue, DatasetStore, InMemoryDataset};
    use crate::repr::FlatTextVardata;

    fn adapter() -> NcfsFuse<InMemoryDataset> {
        let mut ds = InMemoryDataset::new();
        ds.create_dimension("x", 3).unwrap();
        ds.create_variable("foovar", &["x"]).unwrap();
        ds.set_variable_attr("foovar", "fooattr", AttrValue::Text("abc".into()))
            .unwrap();
        ds.set_global_attr("attr1", AttrValue::Text("hello".into()))
            .unwrap();
        NcfsFuse::new(NcFs::new(ds, Box::new(FlatTextVardata::new())))
    }

    #[test]
    fn inode_table_allocates_and_renames() {
        let mut table = InodeTable::new();
        assert_eq!(table.get_or_insert("/"), ROOT_INO);
        let a = table.get_or_insert("/foovar");
        let b = table.get_or_insert("/foovar/fooattr");
        assert_eq!(table.get_or_insert("/foovar"), a);
        table.rename("/foovar", "/barvar");
        assert_eq!(table.path_of(a), Some("/barvar".to_string()));
        assert_eq!(table.path_of(b), Some("/barvar/fooattr".to_string()));
        assert_eq!(table.ino_of("/foovar"), None);
        table.remove("/barvar/fooattr");
        assert_eq!(table.path_of(b), None);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(child_path("/", "foovar"), "/foovar");
        assert_eq!(child_path("/foovar", "fooattr"), "/foovar/fooattr");
        assert_eq!(parent_path("/foovar/fooattr"), "/foovar");
        assert_eq!(parent_path("/foovar"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[tokio::test]
    async fn lookup_and_getattr_resolve_through_the_engine() {
        let fs = adapter();
        let entry = fs
            .lookup(Request::default(), ROOT_INO, OsStr::new("foovar"))
            .await
            .unwrap();
        assert_eq!(entry.attr.kind, FileType::Directory);
        let attr_entry = fs
            .lookup(Request::default(), entry.attr.ino, OsStr::new("fooattr"))
            .await
            .unwrap();
        assert_eq!(attr_entry.attr.kind, FileType::RegularFile);
        assert_eq!(attr_entry.attr.size, 4);
        let missing = fs
            .lookup(Request::default(), ROOT_INO, OsStr::new("nope"))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let fs = adapter();
        let dir = fs
            .lookup(Request::default(), ROOT_INO, OsStr::new("foovar"))
            .await
            .unwrap();
        let file = fs
            .lookup(Request::default(), dir.attr.ino, OsStr::new("fooattr"))
            .await
            .unwrap();
        let ino = file.attr.ino;
        let reply = fs
            .read(Request::default(), ino, 0, 0, 4096)
            .await
            .unwrap();
        assert_eq!(reply.data.as_ref(), b"abc\n");
        let written = fs
            .write(Request::default(), ino, 0, 0, b"xyz\n", 0, 0)
            .await
            .unwrap();
        assert_eq!(written.written, 4);
        let reply = fs
            .read(Request::default(), ino, 0, 0, 4096)
            .await
            .unwrap();
        assert_eq!(reply.data.as_ref(), b"xyz\n");
    }

    #[tokio::test]
    async fn create_unlink_and_rename_update_the_table() {
        let fs = adapter();
        let dir = fs
            .lookup(Request::default(), ROOT_INO, OsStr::new("foovar"))
            .await
            .unwrap();
        let created = fs
            .create(Request::default(), dir.attr.ino, OsStr::new("units"), 0o644, 0)
            .await
            .unwrap();
        assert_eq!(created.attr.size, 0);
        fs.rename(
            Request::default(),
            dir.attr.ino,
            OsStr::new("units"),
            dir.attr.ino,
            OsStr::new("unit"),
        )
        .await
        .unwrap();
        assert!(
            fs.lookup(Request::default(), dir.attr.ino, OsStr::new("unit"))
                .await
                .is_ok()
        );
        fs.unlink(Request::default(), dir.attr.ino, OsStr::new("unit"))
            .await
            .unwrap();
        assert!(
            fs.lookup(Request::default(), dir.attr.ino, OsStr::new("unit"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn mkdir_is_not_supported() {
        let fs = adapter();
        let res = fs
            .mkdir(Request::default(), ROOT_INO, OsStr::new("newdir"), 0o755, 0)
            .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn setattr_size_truncates_the_attribute() {
        let fs = adapter();
        let ino = fs
            .lookup(Request::default(), ROOT_INO, OsStr::new("attr1"))
            .await
            .unwrap()
            .attr
            .ino;
        let set = SetAttr {
            size: Some(2),
            ..Default::default()
        };
        let reply = fs.setattr(Request::default(), ino, None, set).await.unwrap();
        // "he" plus the trailing newline.
        assert_eq!(reply.attr.size, 3);
    }
}
