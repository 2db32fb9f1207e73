//! CSI controller service: volume lifecycle against the configured
//! back-end, serialised per volume name.

use std::sync::Arc;

use rpc::csi::{
    controller_server::Controller as ControllerRpc,
    controller_service_capability, validate_volume_capabilities_response,
    volume_capability::{access_mode::Mode, AccessType},
    ControllerGetCapabilitiesRequest, ControllerGetCapabilitiesResponse,
    ControllerServiceCapability, CreateVolumeRequest, CreateVolumeResponse,
    DeleteVolumeRequest, DeleteVolumeResponse,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse,
    Volume, VolumeCapability,
};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::{backend::Backend, emulate::EmulatedDriver, vlock::VolumeLocks};

pub struct Controller {
    backend: Arc<dyn Backend>,
    locks: Arc<VolumeLocks>,
    driver: &'static EmulatedDriver,
}

impl Controller {
    pub fn new(
        backend: Arc<dyn Backend>,
        locks: Arc<VolumeLocks>,
        driver: &'static EmulatedDriver,
    ) -> Self {
        Self {
            backend,
            locks,
            driver,
        }
    }

    /// Check one capability of a create request against what the emulated
    /// driver supports.
    fn check_capability(
        &self,
        capability: &VolumeCapability,
    ) -> Result<(), Status> {
        match &capability.access_type {
            Some(AccessType::Mount(_)) => {}
            Some(AccessType::Block(_)) => {
                return Err(Status::unimplemented(
                    "Block volumes are not supported",
                ))
            }
            None => {
                return Err(Status::invalid_argument("Missing access type"))
            }
        }
        let mode = capability
            .access_mode
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("Missing access mode"))?;
        let mode = Mode::try_from(mode.mode).map_err(|_| {
            Status::invalid_argument(format!(
                "Unknown access mode {}",
                mode.mode
            ))
        })?;
        if mode == Mode::Unknown {
            return Err(Status::invalid_argument("Missing access mode"));
        }
        if !self.driver.access_modes.contains(&mode) {
            return Err(Status::unimplemented(format!(
                "Access mode {:?} is not supported",
                mode
            )));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl ControllerRpc for Controller {
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.name.is_empty() {
            return Err(Status::invalid_argument("Missing volume name"));
        }
        if msg.volume_capabilities.is_empty() {
            return Err(Status::invalid_argument(
                "Missing volume capabilities",
            ));
        }
        for capability in &msg.volume_capabilities {
            self.check_capability(capability)?;
        }
        if msg.volume_content_source.is_some() {
            return Err(Status::unimplemented(
                "Volume content sources are not supported",
            ));
        }

        let required = msg
            .capacity_range
            .as_ref()
            .map(|range| range.required_bytes)
            .unwrap_or(0);

        let _guard = self.locks.lock(&msg.name).await;
        let capacity = self
            .backend
            .create_volume(&msg.name, required)
            .await
            .map_err(|err| err.into_status())?;
        info!(volume = %msg.name, capacity, "volume available");

        Ok(Response::new(CreateVolumeResponse {
            volume: Some(Volume {
                capacity_bytes: capacity,
                // the name doubles as the id
                volume_id: msg.name,
                volume_context: Default::default(),
                content_source: None,
                accessible_topology: vec![],
            }),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() {
            return Err(Status::invalid_argument("Missing volume id"));
        }
        let _guard = self.locks.lock(&msg.volume_id).await;
        self.backend
            .delete_volume(&msg.volume_id)
            .await
            .map_err(|err| err.into_status())?;
        info!(volume = %msg.volume_id, "volume deleted");
        Ok(Response::new(DeleteVolumeResponse {}))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() {
            return Err(Status::invalid_argument("Missing volume id"));
        }
        if msg.volume_capabilities.is_empty() {
            return Err(Status::invalid_argument(
                "Missing volume capabilities",
            ));
        }
        self.backend
            .check_volume_exists(&msg.volume_id)
            .await
            .map_err(|err| err.into_status())?;

        let supported = msg.volume_capabilities.iter().all(|capability| {
            capability
                .access_mode
                .as_ref()
                .map(|mode| mode.mode == Mode::SingleNodeWriter as i32)
                .unwrap_or(false)
        });
        debug!(volume = %msg.volume_id, supported, "capabilities validated");

        let response = if supported {
            ValidateVolumeCapabilitiesResponse {
                confirmed: Some(
                    validate_volume_capabilities_response::Confirmed {
                        volume_context: msg.volume_context,
                        volume_capabilities: msg.volume_capabilities,
                        parameters: msg.parameters,
                    },
                ),
                message: String::new(),
            }
        } else {
            ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: "Only single node writer is supported".to_string(),
            }
        };
        Ok(Response::new(response))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        Ok(Response::new(ControllerGetCapabilitiesResponse {
            capabilities: self
                .driver
                .service_caps
                .iter()
                .map(|cap| ControllerServiceCapability {
                    r#type: Some(controller_service_capability::Type::Rpc(
                        controller_service_capability::Rpc {
                            r#type: *cap as i32,
                        },
                    )),
                })
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::testing::MockBackend,
        emulate::{self, DEFAULT_DRIVER},
    };
    use common::capacity::MIN_VOLUME_SIZE;
    use rpc::csi::{
        volume_capability::{AccessMode, MountVolume},
        CapacityRange, VolumeContentSource,
    };

    fn controller() -> Controller {
        Controller::new(
            Arc::new(MockBackend::default()),
            Arc::new(VolumeLocks::new()),
            emulate::lookup(DEFAULT_DRIVER).unwrap(),
        )
    }

    fn mount_capability(mode: Mode) -> VolumeCapability {
        VolumeCapability {
            access_type: Some(AccessType::Mount(MountVolume {
                fs_type: String::new(),
                mount_flags: vec![],
            })),
            access_mode: Some(AccessMode { mode: mode as i32 }),
        }
    }

    fn create_request(name: &str, required: i64) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: name.to_string(),
            capacity_range: Some(CapacityRange {
                required_bytes: required,
                limit_bytes: 0,
            }),
            volume_capabilities: vec![mount_capability(
                Mode::SingleNodeWriter,
            )],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_names_equal_ids_and_rounds() {
        let controller = controller();
        let volume = controller
            .create_volume(Request::new(create_request("vol", 1)))
            .await
            .unwrap()
            .into_inner()
            .volume
            .unwrap();
        assert_eq!(volume.volume_id, "vol");
        assert_eq!(volume.capacity_bytes, MIN_VOLUME_SIZE);
    }

    #[tokio::test]
    async fn create_is_idempotent_and_rejects_growth() {
        let controller = controller();
        let first = controller
            .create_volume(Request::new(create_request("vol", 4 << 20)))
            .await
            .unwrap()
            .into_inner();
        let second = controller
            .create_volume(Request::new(create_request("vol", 4 << 20)))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            first.volume.unwrap().capacity_bytes,
            second.volume.unwrap().capacity_bytes
        );

        let err = controller
            .create_volume(Request::new(create_request("vol", 8 << 20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn create_rejects_out_of_range() {
        let controller = controller();
        let err = controller
            .create_volume(Request::new(create_request("vol", 1 << 40)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::OutOfRange);
    }

    #[tokio::test]
    async fn create_rejects_unsupported_shapes() {
        let controller = controller();

        let mut request = create_request("vol", 0);
        request.volume_capabilities = vec![VolumeCapability {
            access_type: Some(AccessType::Block(Default::default())),
            access_mode: Some(AccessMode {
                mode: Mode::SingleNodeWriter as i32,
            }),
        }];
        let err = controller
            .create_volume(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);

        let mut request = create_request("vol", 0);
        request.volume_capabilities =
            vec![mount_capability(Mode::MultiNodeMultiWriter)];
        let err = controller
            .create_volume(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);

        let mut request = create_request("vol", 0);
        request.volume_content_source =
            Some(VolumeContentSource { r#type: None });
        let err = controller
            .create_volume(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);

        let err = controller
            .create_volume(Request::new(CreateVolumeRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let controller = controller();
        controller
            .create_volume(Request::new(create_request("vol", 0)))
            .await
            .unwrap();
        for _ in 0..2 {
            controller
                .delete_volume(Request::new(DeleteVolumeRequest {
                    volume_id: "vol".to_string(),
                    secrets: Default::default(),
                }))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn validate_confirms_only_single_node_writer() {
        let controller = controller();
        controller
            .create_volume(Request::new(create_request("vol", 0)))
            .await
            .unwrap();

        let confirmed = controller
            .validate_volume_capabilities(Request::new(
                ValidateVolumeCapabilitiesRequest {
                    volume_id: "vol".to_string(),
                    volume_capabilities: vec![mount_capability(
                        Mode::SingleNodeWriter,
                    )],
                    ..Default::default()
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert!(confirmed.confirmed.is_some());

        let denied = controller
            .validate_volume_capabilities(Request::new(
                ValidateVolumeCapabilitiesRequest {
                    volume_id: "vol".to_string(),
                    volume_capabilities: vec![mount_capability(
                        Mode::MultiNodeReaderOnly,
                    )],
                    ..Default::default()
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert!(denied.confirmed.is_none());
        assert!(!denied.message.is_empty());

        let err = controller
            .validate_volume_capabilities(Request::new(
                ValidateVolumeCapabilitiesRequest {
                    volume_id: "ghost".to_string(),
                    volume_capabilities: vec![mount_capability(
                        Mode::SingleNodeWriter,
                    )],
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }
}
