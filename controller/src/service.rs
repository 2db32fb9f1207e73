//! Controller grpc service. Every call opens a fresh json-rpc connection
//! to the daemon and closes it when done; the daemon itself is the source
//! of truth for what is provisioned and mapped, so the service keeps no
//! state of its own.

use std::collections::{HashMap, HashSet};

use common::capacity::{round_volume_size, BLOCK_SIZE};
use jsonrpc::{spdk::CreateRbdArgs, Client};
use rpc::v0::{
    controller_server::Controller, map_volume_request::Params, CephParams,
    CheckMallocBdevReply, CheckMallocBdevRequest, MapVolumeReply,
    MapVolumeRequest, ProvisionMallocBdevReply, ProvisionMallocBdevRequest,
    ScsiDisk, UnmapVolumeReply, UnmapVolumeRequest,
};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Highest scsi target number the vhost device accepts.
const MAX_SCSI_TARGETS: u32 = 8;

pub struct ControllerService {
    spdk_socket: String,
    vhost_controller: String,
    /// BDF of the vhost device as the guest sees it, possibly partial.
    /// Merged with the registry default on the consuming side.
    pci_address: String,
    /// Serialises target number selection between concurrent maps.
    map_lock: tokio::sync::Mutex<()>,
}

impl ControllerService {
    pub fn new(
        spdk_socket: String,
        vhost_controller: String,
        pci_address: String,
    ) -> Self {
        Self {
            spdk_socket,
            vhost_controller,
            pci_address,
            map_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn connect(&self) -> Result<Client, Status> {
        Client::connect(&self.spdk_socket)
            .await
            .map_err(|err| err.into_status())
    }

    /// Make sure the bdev backing the volume exists and return its name.
    async fn ensure_bdev(
        &self,
        client: &Client,
        volume_id: &str,
        params: Option<&Params>,
    ) -> Result<String, Status> {
        let exists = match client.get_bdevs(Some(volume_id)).await {
            Ok(bdevs) => !bdevs.is_empty(),
            Err(err) if err.is_invalid_params() => false,
            Err(err) => return Err(err.into_status()),
        };
        match params {
            // malloc is the default; the bdev must have been provisioned
            None | Some(Params::Malloc(_)) => {
                if !exists {
                    return Err(Status::not_found(format!(
                        "No bdev for volume {}",
                        volume_id
                    )));
                }
            }
            Some(Params::Ceph(ceph)) => {
                if !exists {
                    client
                        .construct_rbd_bdev(rbd_args(volume_id, ceph))
                        .await
                        .map_err(|err| err.into_status())?;
                }
            }
        }
        Ok(volume_id.to_string())
    }

    fn reply(&self, target: u32) -> MapVolumeReply {
        MapVolumeReply {
            pci_address: self.pci_address.clone(),
            scsi_disk: Some(ScsiDisk { target, lun: 0 }),
        }
    }
}

fn rbd_args(volume_id: &str, ceph: &CephParams) -> CreateRbdArgs {
    let mut config = HashMap::new();
    if !ceph.monitors.is_empty() {
        config.insert("mon_host".to_string(), ceph.monitors.join(","));
    }
    if !ceph.secret.is_empty() {
        config.insert("key".to_string(), ceph.secret.clone());
    }
    CreateRbdArgs {
        name: volume_id.to_string(),
        user_id: (!ceph.user_id.is_empty()).then(|| ceph.user_id.clone()),
        pool_name: ceph.pool.clone(),
        rbd_name: ceph.image.clone(),
        block_size: BLOCK_SIZE as u32,
        config: (!config.is_empty()).then_some(config),
    }
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn map_volume(
        &self,
        request: Request<MapVolumeRequest>,
    ) -> Result<Response<MapVolumeReply>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() {
            return Err(Status::invalid_argument("Missing volume id"));
        }
        let _serialised = self.map_lock.lock().await;
        let client = self.connect().await?;
        let bdev = self
            .ensure_bdev(&client, &msg.volume_id, msg.params.as_ref())
            .await?;

        let controllers = client
            .get_vhost_controllers()
            .await
            .map_err(|err| err.into_status())?;
        let targets = match controllers
            .into_iter()
            .find(|ctrl| ctrl.ctrlr == self.vhost_controller)
        {
            Some(ctrl) => ctrl.backend_specific.scsi,
            None => {
                info!(ctrlr = %self.vhost_controller, "creating vhost controller");
                client
                    .construct_vhost_scsi_controller(&self.vhost_controller)
                    .await
                    .map_err(|err| err.into_status())?;
                Vec::new()
            }
        };

        // already mapped: answer with the existing coordinates
        if let Some(target) = targets
            .iter()
            .find(|t| t.luns.iter().any(|lun| lun.bdev_name == bdev))
        {
            debug!(volume = %msg.volume_id, target = target.scsi_dev_num,
                   "volume already mapped");
            return Ok(Response::new(self.reply(target.scsi_dev_num)));
        }

        let used: HashSet<u32> =
            targets.iter().map(|t| t.scsi_dev_num).collect();
        let target = (0..MAX_SCSI_TARGETS)
            .find(|num| !used.contains(num))
            .ok_or_else(|| {
                Status::resource_exhausted(format!(
                    "All {} scsi targets of {} in use",
                    MAX_SCSI_TARGETS, self.vhost_controller
                ))
            })?;
        client
            .add_vhost_scsi_lun(&self.vhost_controller, target, &bdev)
            .await
            .map_err(|err| err.into_status())?;
        info!(volume = %msg.volume_id, target, "volume mapped");
        Ok(Response::new(self.reply(target)))
    }

    async fn unmap_volume(
        &self,
        request: Request<UnmapVolumeRequest>,
    ) -> Result<Response<UnmapVolumeReply>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() {
            return Err(Status::invalid_argument("Missing volume id"));
        }
        let _serialised = self.map_lock.lock().await;
        let client = self.connect().await?;

        let controllers = client
            .get_vhost_controllers()
            .await
            .map_err(|err| err.into_status())?;
        let target = controllers
            .into_iter()
            .find(|ctrl| ctrl.ctrlr == self.vhost_controller)
            .and_then(|ctrl| {
                ctrl.backend_specific.scsi.into_iter().find(|t| {
                    t.luns.iter().any(|lun| lun.bdev_name == msg.volume_id)
                })
            });
        match target {
            Some(target) => {
                client
                    .remove_vhost_scsi_target(
                        &self.vhost_controller,
                        target.scsi_dev_num,
                    )
                    .await
                    .map_err(|err| err.into_status())?;
                info!(volume = %msg.volume_id, target = target.scsi_dev_num,
                      "volume unmapped");
            }
            // not mapped is not an error, unmap must be idempotent
            None => {
                debug!(volume = %msg.volume_id, "volume was not mapped")
            }
        }
        Ok(Response::new(UnmapVolumeReply {}))
    }

    async fn provision_malloc_bdev(
        &self,
        request: Request<ProvisionMallocBdevRequest>,
    ) -> Result<Response<ProvisionMallocBdevReply>, Status> {
        let msg = request.into_inner();
        if msg.bdev_name.is_empty() {
            return Err(Status::invalid_argument("Missing bdev name"));
        }
        let client = self.connect().await?;

        if msg.size == 0 {
            match client.delete_bdev(&msg.bdev_name).await {
                Ok(()) => info!(bdev = %msg.bdev_name, "bdev deleted"),
                // deleting what does not exist is success
                Err(err) if err.is_invalid_params() => {}
                Err(err) => return Err(err.into_status()),
            }
            return Ok(Response::new(ProvisionMallocBdevReply {}));
        }

        let size = round_volume_size(msg.size)
            .map_err(|err| Status::out_of_range(err.to_string()))?;
        match client.get_bdevs(Some(&msg.bdev_name)).await {
            Ok(bdevs) if !bdevs.is_empty() => {
                let existing = bdevs[0].size_bytes();
                if existing >= size {
                    return Ok(Response::new(ProvisionMallocBdevReply {}));
                }
                return Err(Status::already_exists(format!(
                    "Bdev {} exists with {} bytes, {} requested",
                    msg.bdev_name, existing, size
                )));
            }
            Ok(_) => {}
            Err(err) if err.is_invalid_params() => {}
            Err(err) => return Err(err.into_status()),
        }
        client
            .construct_malloc_bdev(
                (size / BLOCK_SIZE) as u64,
                BLOCK_SIZE as u32,
                Some(&msg.bdev_name),
                None,
            )
            .await
            .map_err(|err| err.into_status())?;
        info!(bdev = %msg.bdev_name, size, "bdev provisioned");
        Ok(Response::new(ProvisionMallocBdevReply {}))
    }

    async fn check_malloc_bdev(
        &self,
        request: Request<CheckMallocBdevRequest>,
    ) -> Result<Response<CheckMallocBdevReply>, Status> {
        let msg = request.into_inner();
        if msg.bdev_name.is_empty() {
            return Err(Status::invalid_argument("Missing bdev name"));
        }
        let client = self.connect().await?;
        match client.get_bdevs(Some(&msg.bdev_name)).await {
            Ok(bdevs) if !bdevs.is_empty() => {
                Ok(Response::new(CheckMallocBdevReply {}))
            }
            Ok(_) => Err(Status::not_found(format!(
                "No bdev {}",
                msg.bdev_name
            ))),
            Err(err) if err.is_invalid_params() => Err(Status::not_found(
                format!("No bdev {}", msg.bdev_name),
            )),
            Err(err) => Err(err.into_status()),
        }
    }
}
