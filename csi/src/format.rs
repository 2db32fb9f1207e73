//! Formatting devices, guarded by a filesystem probe so an already
//! formatted volume is mounted as-is and never wiped.

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Failed to run {cmd}: {source}")]
    Spawn {
        cmd: String,
        source: std::io::Error,
    },
    #[error("{cmd} on {device} failed: {stderr}")]
    Failed {
        cmd: String,
        device: String,
        stderr: String,
    },
}

/// Existing filesystem type on the device, if blkid detects one.
async fn probe(device: &str) -> Result<Option<String>, FormatError> {
    let output = Command::new("blkid")
        .args(["-o", "value", "-s", "TYPE"])
        .arg(device)
        .output()
        .await
        .map_err(|source| FormatError::Spawn {
            cmd: "blkid".to_string(),
            source,
        })?;
    // blkid exits nonzero when it finds nothing
    if !output.status.success() {
        return Ok(None);
    }
    let fstype = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!fstype.is_empty()).then_some(fstype))
}

pub async fn probed_format(
    device: &str,
    fstype: &str,
) -> Result<(), FormatError> {
    if let Some(existing) = probe(device).await? {
        debug!(device, existing, "already formatted");
        return Ok(());
    }

    let cmd = format!("mkfs.{}", fstype);
    let mut command = Command::new(&cmd);
    // don't balk at the device looking like a whole disk
    match fstype {
        "ext2" | "ext3" | "ext4" => {
            command.arg("-F");
        }
        "xfs" => {
            command.arg("-f");
        }
        _ => {}
    }
    let output = command.arg(device).output().await.map_err(|source| {
        FormatError::Spawn {
            cmd: cmd.clone(),
            source,
        }
    })?;
    if !output.status.success() {
        return Err(FormatError::Failed {
            cmd,
            device: device.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    info!(device, fstype, "formatted");
    Ok(())
}
