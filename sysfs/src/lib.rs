//! Locating the block device node that belongs to a mapped volume.
//!
//! The kernel lists every block device as a `<major>:<minor>` symlink under
//! `/sys/dev/block`; the link target encodes the device topology. We match
//! that target against the PCI function the volume was mapped to and, when
//! virtio-scsi is in use, against the SCSI coordinates behind it.

pub mod pci;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use futures::StreamExt;
use inotify::{Inotify, WatchMask};
use regex::Regex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::pci::{AddressError, PciAddress, ScsiDisk};

/// Default directory scanned for block device links.
pub const SYS_DEV_BLOCK: &str = "/sys/dev/block";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to scan {dir}: {source}")]
    Scan {
        dir: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("Bad device match pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Timed out waiting for device")]
    DeadlineExceeded,
}

/// A resolved block device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

fn pci_pattern(addr: &PciAddress) -> String {
    format!(
        "/pci[0-9a-f]{{4}}:[0-9a-f]{{2}}/{:04x}:{:02x}:{:02x}\\.{:x}/",
        addr.domain, addr.bus, addr.device, addr.function
    )
}

fn scsi_pattern(disk: &ScsiDisk) -> String {
    format!(
        "/target[0-9]+:[0-9]+:[0-9]+/[0-9]+:[0-9]+:{}:{}/block/",
        disk.target, disk.lun
    )
}

/// Scan `dir` once for a block device behind the given PCI function (and
/// SCSI unit, when given). Entries are visited in lexicographic order so a
/// whole-disk link (`8:0`) wins over its partitions (`8:1`, ...).
pub fn find_device(
    dir: &Path,
    addr: &PciAddress,
    scsi: Option<&ScsiDisk>,
) -> Result<Option<BlockDevice>, Error> {
    let addr = addr.complete()?;
    let pci_re = Regex::new(&pci_pattern(&addr))?;
    let scsi_re = match scsi {
        Some(disk) => Some(Regex::new(&scsi_pattern(disk))?),
        None => None,
    };

    let mut entries = Vec::new();
    let iter = std::fs::read_dir(dir).map_err(|source| Error::Scan {
        dir: dir.to_path_buf(),
        source,
    })?;
    for entry in iter {
        let entry = entry.map_err(|source| Error::Scan {
            dir: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.file_name());
    }
    entries.sort();

    for file_name in entries {
        let link_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        let (major, minor) = match link_name.split_once(':') {
            Some((major, minor)) => {
                match (major.parse::<u32>(), minor.parse::<u32>()) {
                    (Ok(major), Ok(minor)) => (major, minor),
                    _ => continue,
                }
            }
            None => continue,
        };

        let target = match std::fs::read_link(dir.join(&file_name)) {
            Ok(target) => target,
            // entries may vanish while we scan
            Err(_) => continue,
        };
        let target = target.to_string_lossy();

        let pci_match = match pci_re.find(&target) {
            Some(found) => found,
            None => continue,
        };
        // the SCSI unit must sit behind the matched PCI function, so only
        // the remainder of the link target counts
        if let Some(scsi_re) = &scsi_re {
            if !scsi_re.is_match(&target[pci_match.end() - 1..]) {
                continue;
            }
        }

        let name = match target.rsplit_once("/block/") {
            Some((_, name)) if !name.is_empty() => name.to_string(),
            _ => continue,
        };
        debug!(device = %name, major, minor, "matched block device");
        return Ok(Some(BlockDevice { name, major, minor }));
    }
    Ok(None)
}

/// Wait until a matching device shows up or the timeout expires.
///
/// A watch on the scan directory triggers rescans, with an unconditional
/// rescan every five seconds because inotify has been seen to miss events
/// on sysfs. When the watch cannot be set up at all we degrade to pure
/// polling.
pub async fn wait_for_device(
    dir: &Path,
    addr: &PciAddress,
    scsi: Option<&ScsiDisk>,
    timeout: Duration,
) -> Result<BlockDevice, Error> {
    const RESCAN: Duration = Duration::from_secs(5);

    let deadline = Instant::now() + timeout;
    let mut events = match watch(dir) {
        Ok(events) => Some(events),
        Err(err) => {
            warn!("No directory watch on {}, polling only: {}", dir.display(), err);
            None
        }
    };

    loop {
        if let Some(device) = find_device(dir, addr, scsi)? {
            return Ok(device);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::DeadlineExceeded);
        }
        let tick = RESCAN.min(deadline - now);
        let mut lost_watch = false;
        match &mut events {
            Some(stream) => {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    event = stream.next() => {
                        lost_watch = !matches!(event, Some(Ok(_)));
                    }
                }
            }
            None => tokio::time::sleep(tick).await,
        }
        if lost_watch {
            warn!("Directory watch failed, polling only");
            events = None;
        }
    }
}

fn watch(
    dir: &Path,
) -> std::io::Result<inotify::EventStream<[u8; 4096]>> {
    let inotify = Inotify::init()?;
    inotify.watches().add(
        dir,
        WatchMask::CREATE | WatchMask::MOVED_TO | WatchMask::DELETE,
    )?;
    inotify.into_event_stream([0u8; 4096])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    const SDA_TARGET: &str = "../../devices/pci0000:00/0000:00:17.0/ata1/\
                              host0/target0:0:0/0:0:0:0/block/sda";
    const SDB_TARGET: &str = "../../devices/pci0000:00/0000:00:17.0/ata1/\
                              host0/target0:0:1/0:0:1:0/block/sdb";

    fn pci(s: &str) -> PciAddress {
        s.parse().unwrap()
    }

    #[test]
    fn finds_device_by_pci_address() {
        let dir = tempfile::tempdir().unwrap();
        symlink(SDA_TARGET, dir.path().join("8:0")).unwrap();

        let found = find_device(dir.path(), &pci("0000:00:17.0"), None)
            .unwrap()
            .unwrap();
        assert_eq!(
            found,
            BlockDevice {
                name: "sda".to_string(),
                major: 8,
                minor: 0
            }
        );
        assert!(find_device(dir.path(), &pci("0000:00:18.0"), None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn matches_scsi_unit_behind_the_function() {
        let dir = tempfile::tempdir().unwrap();
        symlink(SDA_TARGET, dir.path().join("8:0")).unwrap();
        symlink(SDB_TARGET, dir.path().join("8:16")).unwrap();

        let addr = pci("0000:00:17.0");
        let sda = ScsiDisk { target: 0, lun: 0 };
        let sdb = ScsiDisk { target: 1, lun: 0 };
        let none = ScsiDisk { target: 2, lun: 0 };

        assert_eq!(
            find_device(dir.path(), &addr, Some(&sda))
                .unwrap()
                .unwrap()
                .name,
            "sda"
        );
        assert_eq!(
            find_device(dir.path(), &addr, Some(&sdb))
                .unwrap()
                .unwrap()
                .name,
            "sdb"
        );
        assert!(find_device(dir.path(), &addr, Some(&none))
            .unwrap()
            .is_none());
    }

    #[test]
    fn whole_disk_sorts_before_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let partition = format!("{}/sda1", SDA_TARGET);
        symlink(&partition, dir.path().join("8:1")).unwrap();
        symlink(SDA_TARGET, dir.path().join("8:0")).unwrap();

        let found = find_device(dir.path(), &pci("0000:00:17.0"), None)
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "sda");
        assert_eq!(found.minor, 0);
    }

    #[test]
    fn requires_complete_address() {
        let dir = tempfile::tempdir().unwrap();
        let incomplete: PciAddress = "::.0".parse().unwrap();
        let err = find_device(dir.path(), &incomplete, None);
        assert!(matches!(err, Err(Error::Address(_))));
    }

    #[tokio::test]
    async fn waits_for_device_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("8:0");
        let create = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            symlink(SDA_TARGET, link).unwrap();
        });

        let found = wait_for_device(
            dir.path(),
            &pci("0000:00:17.0"),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(found.name, "sda");
        create.await.unwrap();
    }

    #[tokio::test]
    async fn gives_up_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let err = wait_for_device(
            dir.path(),
            &pci("0000:00:17.0"),
            None,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(err, Err(Error::DeadlineExceeded)));
    }
}
