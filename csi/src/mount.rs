//! Mount table probing and mount/unmount operations.

use std::io;

use proc_mounts::MountIter;
use sys_mount::{FilesystemType, Mount, MountFlags, UnmountFlags};
use tracing::debug;

/// A filesystem the plugin can format and mount, with the mount options it
/// always applies.
#[derive(Debug, Clone)]
pub struct Fs {
    pub name: String,
    pub defaults: Vec<String>,
}

pub fn default_filesystems() -> Vec<Fs> {
    vec![
        Fs {
            name: "ext4".to_string(),
            defaults: vec![],
        },
        Fs {
            name: "xfs".to_string(),
            defaults: vec![],
        },
    ]
}

#[derive(Debug, Clone)]
pub struct MountEntry {
    pub source: String,
    pub dest: String,
    pub fstype: String,
    pub opts: Vec<String>,
}

/// First mount table entry matching the given source and/or target.
pub fn match_mount(
    source: Option<&str>,
    target: Option<&str>,
) -> io::Result<Option<MountEntry>> {
    for mount in MountIter::new()? {
        let mount = mount?;
        if let Some(source) = source {
            if mount.source.to_string_lossy() != source {
                continue;
            }
        }
        if let Some(target) = target {
            if mount.dest.to_string_lossy() != target {
                continue;
            }
        }
        return Ok(Some(MountEntry {
            source: mount.source.to_string_lossy().to_string(),
            dest: mount.dest.to_string_lossy().to_string(),
            fstype: mount.fstype,
            opts: mount.options,
        }));
    }
    Ok(None)
}

pub fn mount_fs(
    device: &str,
    target: &str,
    fstype: &str,
    flags: &[String],
    readonly: bool,
) -> io::Result<()> {
    let mut mount_flags = MountFlags::empty();
    if readonly {
        mount_flags |= MountFlags::RDONLY;
    }
    let data = flags.join(",");
    debug!(device, target, fstype, data, "mounting");
    let mut builder = Mount::builder()
        .fstype(FilesystemType::Manual(fstype))
        .flags(mount_flags);
    if !data.is_empty() {
        builder = builder.data(&data);
    }
    builder.mount(device, target)?;
    Ok(())
}

/// Bind the staged mount onto the publish target. Read-only binds need the
/// extra remount step for the flag to take effect.
pub fn bind_mount(
    source: &str,
    target: &str,
    readonly: bool,
) -> io::Result<()> {
    debug!(source, target, readonly, "bind mounting");
    Mount::builder()
        .flags(MountFlags::BIND)
        .mount(source, target)?;
    if readonly {
        Mount::builder()
            .flags(MountFlags::BIND | MountFlags::REMOUNT | MountFlags::RDONLY)
            .mount(source, target)?;
    }
    Ok(())
}

pub fn unmount_fs(target: &str) -> io::Result<()> {
    debug!(target, "unmounting");
    sys_mount::unmount(target, UnmountFlags::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_root_mount() {
        let root = match_mount(None, Some("/")).unwrap().unwrap();
        assert_eq!(root.dest, "/");
        assert!(!root.fstype.is_empty());
    }

    #[test]
    fn misses_unmounted_paths() {
        assert!(match_mount(None, Some("/definitely/not/mounted"))
            .unwrap()
            .is_none());
    }
}
