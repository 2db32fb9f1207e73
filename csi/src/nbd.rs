//! Utility functions for working with nbd devices.
//!
//! The kernel pre-creates `/dev/nbd0`, `/dev/nbd1`, ... and an instance is
//! free exactly while its size reads as zero. Probing is racy by nature;
//! we assume sole ownership of the nbd namespace on this host.

use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::backend::BackendError;

/// Size of the device behind `path`. Seeking to the end works for block
/// devices and plain files alike; the BLKGETSIZE64 ioctl would be the
/// proper form.
pub fn device_size(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}

/// First nbd instance with size zero, probing `nbd0`, `nbd1`, ... in order.
/// The first name that does not exist ends the probe.
pub fn find_unused(dev_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut instance = 0;
    loop {
        let path = dev_dir.join(format!("nbd{}", instance));
        match device_size(&path) {
            Ok(0) => return Ok(Some(path)),
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(err) => return Err(err),
        }
        instance += 1;
    }
}

/// Poll until the freshly exported device reports a nonzero size.
pub async fn wait_until_ready(
    path: &Path,
    timeout: Duration,
) -> Result<(), BackendError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match device_size(path) {
            Ok(size) if size > 0 => return Ok(()),
            Ok(_) => {}
            Err(err) => {
                return Err(BackendError::Internal(format!(
                    "Probing {}: {}",
                    path.display(),
                    err
                )))
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(BackendError::DeadlineExceeded);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_zero_sized_instance() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nbd0"), b"busy").unwrap();
        std::fs::write(dir.path().join("nbd1"), b"").unwrap();
        std::fs::write(dir.path().join("nbd2"), b"").unwrap();

        let free = find_unused(dir.path()).unwrap().unwrap();
        assert_eq!(free, dir.path().join("nbd1"));
    }

    #[test]
    fn probe_ends_at_first_missing_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nbd0"), b"busy").unwrap();
        // nbd1 missing, nbd2 free but never reached
        std::fs::write(dir.path().join("nbd2"), b"").unwrap();

        assert!(find_unused(dir.path()).unwrap().is_none());
    }
}
