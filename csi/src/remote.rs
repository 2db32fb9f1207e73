//! Remote back-end: volume operations travel through the registry, which
//! proxies them to the controller named by the `controllerid` metadata.
//! Every operation dials a fresh TLS channel so rotated credentials are
//! picked up, mirroring the fresh-connection rule of the direct path.

use std::{path::PathBuf, time::Duration};

use common::{capacity::round_volume_size, endpoint::Dialer};
use rpc::v0::{
    controller_client::ControllerClient, registry_client::RegistryClient,
    CheckMallocBdevRequest, GetValuesRequest, MapVolumeRequest,
    ProvisionMallocBdevRequest, UnmapVolumeRequest, CONTROLLER_ID_KEY,
    PCI_LEAF,
};
use sysfs::pci::{PciAddress, ScsiDisk};
use tonic::{
    metadata::{Ascii, MetadataValue},
    transport::Channel,
};
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Device, DeviceRequest},
    dev,
    emulate::EmulatedDriver,
};

const DEVICE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RemoteBackend {
    registry: String,
    controller_id: String,
    metadata: MetadataValue<Ascii>,
    dialer: Dialer,
    driver: &'static EmulatedDriver,
    block_dir: PathBuf,
    dev_dir: PathBuf,
    wait_timeout: Duration,
}

impl RemoteBackend {
    pub fn new(
        registry: impl Into<String>,
        controller_id: impl Into<String>,
        dialer: Dialer,
        driver: &'static EmulatedDriver,
    ) -> Result<Self, BackendError> {
        let controller_id = controller_id.into();
        let metadata = controller_id.parse().map_err(|_| {
            BackendError::InvalidArgument(format!(
                "Controller id {:?} is not valid metadata",
                controller_id
            ))
        })?;
        Ok(Self {
            registry: registry.into(),
            controller_id,
            metadata,
            dialer,
            driver,
            block_dir: PathBuf::from(sysfs::SYS_DEV_BLOCK),
            dev_dir: PathBuf::from("/dev"),
            wait_timeout: DEVICE_WAIT_TIMEOUT,
        })
    }

    async fn channel(&self) -> Result<Channel, BackendError> {
        Ok(self.dialer.dial(&self.registry).await?)
    }

    /// Wrap a message with the routing metadata the proxy dispatches on.
    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(CONTROLLER_ID_KEY, self.metadata.clone());
        request
    }

    /// Default PCI address registered for this controller, if any.
    async fn default_pci(
        &self,
    ) -> Result<Option<PciAddress>, BackendError> {
        let mut client = RegistryClient::new(self.channel().await?);
        let values = client
            .get_values(GetValuesRequest {
                path: format!("{}/{}", self.controller_id, PCI_LEAF),
            })
            .await
            .map_err(BackendError::from)?
            .into_inner()
            .values;
        match values.first() {
            Some(value) => {
                let addr =
                    value.value.parse::<PciAddress>().map_err(|err| {
                        BackendError::Internal(format!(
                            "Registered PCI default for {}: {}",
                            self.controller_id, err
                        ))
                    })?;
                Ok(Some(addr))
            }
            None => Ok(None),
        }
    }

    async fn unmap(&self, volume_id: &str) -> Result<(), BackendError> {
        let mut client = ControllerClient::new(self.channel().await?);
        client
            .unmap_volume(self.request(UnmapVolumeRequest {
                volume_id: volume_id.to_string(),
            }))
            .await
            .map_err(BackendError::from)?;
        Ok(())
    }
}

#[tonic::async_trait]
impl Backend for RemoteBackend {
    async fn create_volume(
        &self,
        volume_id: &str,
        required_bytes: i64,
    ) -> Result<i64, BackendError> {
        let size = round_volume_size(required_bytes)?;
        let mut client = ControllerClient::new(self.channel().await?);
        client
            .provision_malloc_bdev(self.request(ProvisionMallocBdevRequest {
                bdev_name: volume_id.to_string(),
                size,
            }))
            .await
            .map_err(BackendError::from)?;
        Ok(size)
    }

    async fn delete_volume(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        let mut client = ControllerClient::new(self.channel().await?);
        client
            .provision_malloc_bdev(self.request(ProvisionMallocBdevRequest {
                bdev_name: volume_id.to_string(),
                // zero size deletes
                size: 0,
            }))
            .await
            .map_err(BackendError::from)?;
        Ok(())
    }

    async fn check_volume_exists(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        let mut client = ControllerClient::new(self.channel().await?);
        client
            .check_malloc_bdev(self.request(CheckMallocBdevRequest {
                bdev_name: volume_id.to_string(),
            }))
            .await
            .map_err(BackendError::from)?;
        Ok(())
    }

    async fn create_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Device, BackendError> {
        let params = (self.driver.map_volume_params)(request)?;
        let mut client = ControllerClient::new(self.channel().await?);
        let reply = client
            .map_volume(self.request(MapVolumeRequest {
                volume_id: request.volume_id.clone(),
                params: Some(params),
            }))
            .await
            .map_err(BackendError::from)?
            .into_inner();

        // the controller's answer may be partial; the registry can hold
        // the missing fields
        let reported = if reply.pci_address.is_empty() {
            PciAddress::default()
        } else {
            reply.pci_address.parse::<PciAddress>().map_err(|err| {
                BackendError::Internal(format!(
                    "Controller {} returned bad PCI address: {}",
                    self.controller_id, err
                ))
            })?
        };
        let merged = match self.default_pci().await? {
            Some(default) => reported.merge(&default),
            None => reported,
        };
        let addr = merged.complete().map_err(|err| {
            BackendError::FailedPrecondition(err.to_string())
        })?;
        let scsi = reply.scsi_disk.map(|disk| ScsiDisk {
            target: disk.target,
            lun: disk.lun,
        });

        let found = match sysfs::wait_for_device(
            &self.block_dir,
            &addr,
            scsi.as_ref(),
            self.wait_timeout,
        )
        .await
        {
            Ok(found) => found,
            Err(err) => {
                // roll the mapping back, nothing usable appeared
                let _ = self.unmap(&request.volume_id).await;
                return Err(match err {
                    sysfs::Error::DeadlineExceeded => {
                        BackendError::DeadlineExceeded
                    }
                    other => BackendError::Internal(other.to_string()),
                });
            }
        };
        info!(volume = %request.volume_id, device = %found.name,
              pci = %addr, "device appeared");

        match dev::materialise(&found, &self.dev_dir, "oxbow") {
            Ok((path, cleanup)) => Ok(Device {
                path,
                cleanup: Some(cleanup),
            }),
            Err(err) => {
                let _ = self.unmap(&request.volume_id).await;
                Err(err)
            }
        }
    }

    async fn delete_device(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        // the controller treats an unmapped volume as success
        self.unmap(volume_id).await
    }
}
