//! Typed wrappers for the SPDK methods the rest of the system drives:
//! bdev inspection, malloc bdev lifecycle, nbd export and the vhost-scsi
//! surface used to hand disks into a co-located guest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Error, Client};

/// Subset of the bdev description the daemon returns that we care about.
/// Unknown fields are ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bdev {
    pub name: String,
    pub num_blocks: u64,
    pub block_size: u32,
}

impl Bdev {
    pub fn size_bytes(&self) -> i64 {
        self.num_blocks as i64 * i64::from(self.block_size)
    }
}

#[derive(Debug, Serialize)]
pub struct GetBdevsArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMallocArgs {
    pub num_blocks: u64,
    pub block_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteBdevArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StartNbdDiskArgs {
    pub bdev_name: String,
    pub nbd_device: String,
}

#[derive(Debug, Serialize)]
pub struct StopNbdDiskArgs {
    pub nbd_device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbdDisk {
    pub nbd_device: String,
    pub bdev_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateVhostScsiControllerArgs {
    pub ctrlr: String,
}

#[derive(Debug, Serialize)]
pub struct AddVhostScsiLunArgs {
    pub ctrlr: String,
    pub scsi_target_num: u32,
    pub bdev_name: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveVhostScsiTargetArgs {
    pub ctrlr: String,
    pub scsi_target_num: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VhostScsiLun {
    pub bdev_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VhostScsiTarget {
    pub scsi_dev_num: u32,
    #[serde(default)]
    pub luns: Vec<VhostScsiLun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VhostBackend {
    #[serde(default)]
    pub scsi: Vec<VhostScsiTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VhostController {
    pub ctrlr: String,
    #[serde(default)]
    pub backend_specific: VhostBackend,
}

#[derive(Debug, Serialize)]
pub struct CreateRbdArgs {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub pool_name: String,
    pub rbd_name: String,
    pub block_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<HashMap<String, String>>,
}

impl Client {
    /// List bdevs, optionally restricted to one name. Asking for a name the
    /// daemon does not know fails with invalid-params.
    pub async fn get_bdevs(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<Bdev>, Error> {
        self.call(
            "get_bdevs",
            name.map(|name| GetBdevsArgs {
                name: name.to_string(),
            }),
        )
        .await
    }

    /// Create an in-memory bdev and return the created name(s).
    pub async fn construct_malloc_bdev(
        &self,
        num_blocks: u64,
        block_size: u32,
        name: Option<&str>,
        uuid: Option<&str>,
    ) -> Result<Vec<String>, Error> {
        self.call(
            "construct_malloc_bdev",
            Some(CreateMallocArgs {
                num_blocks,
                block_size,
                name: name.map(str::to_string),
                uuid: uuid.map(str::to_string),
            }),
        )
        .await
    }

    pub async fn delete_bdev(&self, name: &str) -> Result<(), Error> {
        self.call_void(
            "delete_bdev",
            Some(DeleteBdevArgs {
                name: name.to_string(),
            }),
        )
        .await
    }

    /// Export a bdev through the kernel nbd device given as `/dev/nbdX`.
    pub async fn start_nbd_disk(
        &self,
        bdev_name: &str,
        nbd_device: &str,
    ) -> Result<(), Error> {
        self.call_void(
            "start_nbd_disk",
            Some(StartNbdDiskArgs {
                bdev_name: bdev_name.to_string(),
                nbd_device: nbd_device.to_string(),
            }),
        )
        .await
    }

    pub async fn stop_nbd_disk(&self, nbd_device: &str) -> Result<(), Error> {
        self.call_void(
            "stop_nbd_disk",
            Some(StopNbdDiskArgs {
                nbd_device: nbd_device.to_string(),
            }),
        )
        .await
    }

    pub async fn get_nbd_disks(&self) -> Result<Vec<NbdDisk>, Error> {
        self.call::<(), Vec<NbdDisk>>("get_nbd_disks", None).await
    }

    pub async fn construct_vhost_scsi_controller(
        &self,
        ctrlr: &str,
    ) -> Result<(), Error> {
        self.call_void(
            "construct_vhost_scsi_controller",
            Some(CreateVhostScsiControllerArgs {
                ctrlr: ctrlr.to_string(),
            }),
        )
        .await
    }

    pub async fn add_vhost_scsi_lun(
        &self,
        ctrlr: &str,
        scsi_target_num: u32,
        bdev_name: &str,
    ) -> Result<(), Error> {
        self.call_void(
            "add_vhost_scsi_lun",
            Some(AddVhostScsiLunArgs {
                ctrlr: ctrlr.to_string(),
                scsi_target_num,
                bdev_name: bdev_name.to_string(),
            }),
        )
        .await
    }

    pub async fn remove_vhost_scsi_target(
        &self,
        ctrlr: &str,
        scsi_target_num: u32,
    ) -> Result<(), Error> {
        self.call_void(
            "remove_vhost_scsi_target",
            Some(RemoveVhostScsiTargetArgs {
                ctrlr: ctrlr.to_string(),
                scsi_target_num,
            }),
        )
        .await
    }

    pub async fn get_vhost_controllers(
        &self,
    ) -> Result<Vec<VhostController>, Error> {
        self.call::<(), Vec<VhostController>>("get_vhost_controllers", None)
            .await
    }

    /// Create a Ceph RBD backed bdev and return its name.
    pub async fn construct_rbd_bdev(
        &self,
        args: CreateRbdArgs,
    ) -> Result<String, Error> {
        self.call("construct_rbd_bdev", Some(args)).await
    }
}
