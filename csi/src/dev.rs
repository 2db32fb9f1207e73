//! Materialising block device nodes.
//!
//! A container's `/dev` is populated when the container starts, which can
//! predate the device we just mapped. The node is therefore created by hand
//! in a scratch directory under `/dev` and removed again once the mount no
//! longer needs it.

use std::path::{Path, PathBuf};

use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use sysfs::BlockDevice;
use tracing::warn;

use crate::backend::{BackendError, Cleanup};

/// Create `<dev_dir>/<prefix>-XXXX/<name>` as a block special file for the
/// resolved device. The returned cleanup removes node and directory.
pub fn materialise(
    device: &BlockDevice,
    dev_dir: &Path,
    prefix: &str,
) -> Result<(PathBuf, Cleanup), BackendError> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("{}-", prefix))
        .tempdir_in(dev_dir)
        .map_err(|err| {
            BackendError::Internal(format!(
                "Creating scratch dir under {}: {}",
                dev_dir.display(),
                err
            ))
        })?
        .into_path();

    // partition suffixes come as "sda/sda1", the node name is the leaf
    let leaf = device.name.rsplit('/').next().unwrap_or(&device.name);
    let node = dir.join(leaf);
    if let Err(err) = mknod(
        &node,
        SFlag::S_IFBLK,
        Mode::from_bits_truncate(0o600),
        makedev(u64::from(device.major), u64::from(device.minor)),
    ) {
        let _ = std::fs::remove_dir(&dir);
        return Err(BackendError::Internal(format!(
            "mknod {} ({}:{}): {}",
            node.display(),
            device.major,
            device.minor,
            err
        )));
    }

    let cleanup_node = node.clone();
    let cleanup: Cleanup = Box::new(move || {
        if let Err(err) = std::fs::remove_file(&cleanup_node) {
            warn!("Failed to remove {}: {}", cleanup_node.display(), err);
        }
        if let Err(err) = std::fs::remove_dir(&dir) {
            warn!("Failed to remove {}: {}", dir.display(), err);
        }
    });
    Ok((node, cleanup))
}
