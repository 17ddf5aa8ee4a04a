//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Unix-like systems. On Linux we support unprivileged
//!   mount via fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use crate::dataset::DatasetStore;
use crate::fuse::NcfsFuse;

/// Build default mount options for ncfs.
#[allow(dead_code)]
fn default_mount_options() -> MountOptions {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };
    let mut mo = MountOptions::default();
    // Conservative defaults: no allow_other, empty mountpoint required.
    mo.fs_name("ncfs").force_readdir_plus(true).uid(uid).gid(gid);
    mo
}

/// Mount onto the given empty directory using unprivileged mode.
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged<D>(
    fs: NcfsFuse<D>,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle>
where
    D: DatasetStore + Send + 'static,
{
    let opts = default_mount_options();
    let session = rfuse3::raw::Session::new(opts);
    // Unprivileged mount requires fusermount3 in PATH.
    session.mount_with_unprivileged(fs, mount_point).await
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged<D>(
    _fs: NcfsFuse<D>,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle>
where
    D: DatasetStore + Send + 'static,
{
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
