//! CSI node service: makes a created volume usable on this node by
//! resolving a device for it, formatting, and mounting, and unwinds all of
//! that again on the way out. All volume-scoped calls serialise on the
//! volume name.

use std::{
    collections::{HashMap, HashSet},
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::Arc,
};

use rpc::csi::{
    node_service_capability, volume_capability,
    volume_capability::MountVolume, NodeGetCapabilitiesRequest,
    NodeGetCapabilitiesResponse, NodeGetInfoRequest, NodeGetInfoResponse,
    NodePublishVolumeRequest, NodePublishVolumeResponse,
    NodeServiceCapability, NodeStageVolumeRequest, NodeStageVolumeResponse,
    NodeUnpublishVolumeRequest, NodeUnpublishVolumeResponse,
    NodeUnstageVolumeRequest, NodeUnstageVolumeResponse, VolumeCapability,
};
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use crate::{
    backend::{Backend, DeviceRequest},
    format::probed_format,
    mount::{self, Fs},
    vlock::VolumeLocks,
};

pub struct Node {
    pub node_id: String,
    backend: Arc<dyn Backend>,
    locks: Arc<VolumeLocks>,
    filesystems: Vec<Fs>,
    /// Volumes whose device was created by a publish without a staging
    /// path; their unpublish owns the device teardown.
    unstaged_publishes: std::sync::Mutex<HashSet<String>>,
}

// Determine if given access mode in conjunction with ro mount flag makes
// sense or not. If access mode is not supported or the combination does
// not make sense, return error string.
//
// NOTE: Access mode does not control if the mount is rw/ro (that is
// rather part of the mount flags). Access mode serves as advisory info
// for the orchestrator when attaching volumes to pods.
fn check_access_mode(
    volume_id: &str,
    access_mode: &Option<volume_capability::AccessMode>,
    readonly: bool,
) -> Result<(), String> {
    use rpc::csi::volume_capability::access_mode::Mode;

    let rdonly_access_mode = match access_mode {
        Some(mode) => match Mode::try_from(mode.mode) {
            Ok(Mode::SingleNodeWriter) => false,
            Ok(Mode::SingleNodeReaderOnly) => true,
            Ok(Mode::MultiNodeReaderOnly) => true,
            other => {
                return Err(format!(
                    "Unsupported publish volume mode {:?} for {}",
                    other, volume_id
                ));
            }
        },
        None => return Err(format!("Missing publish mode for {}", volume_id)),
    };
    if !readonly && rdonly_access_mode {
        Err(format!(
            "Invalid combination of access mode and ro mount flag for {}",
            volume_id,
        ))
    } else {
        Ok(())
    }
}

/// The mount access type of the capability, rejecting block volumes.
fn mount_capability<'a>(
    volume_id: &str,
    capability: &'a Option<VolumeCapability>,
) -> Result<&'a MountVolume, Status> {
    match capability.as_ref().and_then(|cap| cap.access_type.as_ref()) {
        Some(volume_capability::AccessType::Mount(mnt)) => Ok(mnt),
        Some(volume_capability::AccessType::Block(_)) => Err(
            Status::invalid_argument("Raw block volumes are not supported"),
        ),
        None => Err(Status::invalid_argument(format!(
            "Missing access type for {}",
            volume_id
        ))),
    }
}

/// Create the mount target with 0750 permissions. Returns whether this
/// call created it, so error paths know to remove it again.
fn prepare_target(target: &str) -> Result<bool, Status> {
    let path = Path::new(target);
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(path).map_err(|err| {
        Status::internal(format!(
            "Failed to create mountpoint {}: {}",
            target, err
        ))
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o750))
        .map_err(|err| {
            Status::internal(format!(
                "Failed to chmod mountpoint {}: {}",
                target, err
            ))
        })?;
    Ok(true)
}

impl Node {
    pub fn new(
        node_id: String,
        backend: Arc<dyn Backend>,
        locks: Arc<VolumeLocks>,
    ) -> Self {
        Self {
            node_id,
            backend,
            locks,
            filesystems: mount::default_filesystems(),
            unstaged_publishes: Default::default(),
        }
    }

    fn select_filesystem(&self, name: &str) -> Result<Fs, Status> {
        if name.is_empty() {
            return Ok(self.filesystems[0].clone());
        }
        self.filesystems
            .iter()
            .find(|fs| fs.name == name)
            .cloned()
            .ok_or_else(|| {
                Status::invalid_argument(format!(
                    "Filesystem {} is not supported",
                    name
                ))
            })
    }

    /// The device pipeline shared by stage and by publish-without-stage:
    /// prepare the target, resolve a device, format if blank, mount. Every
    /// partially created resource is unwound if a later step fails, and
    /// the back-end's cleanup runs on success and failure alike.
    async fn stage_device(
        &self,
        device_request: &DeviceRequest,
        target: &str,
        filesystem: &Fs,
        mount_flags: &[String],
        readonly: bool,
    ) -> Result<(), Status> {
        let volume_id = device_request.volume_id.as_str();

        if mount::match_mount(None, Some(target))
            .map_err(|err| Status::internal(err.to_string()))?
            .is_some()
        {
            info!(volume = volume_id, target, "already mounted");
            return Ok(());
        }
        let created_dir = prepare_target(target)?;

        let device = match self.backend.create_device(device_request).await {
            Ok(device) => device,
            Err(err) => {
                if created_dir {
                    let _ = std::fs::remove_dir(target);
                }
                return Err(err.into_status());
            }
        };
        let device_path = device.path.to_string_lossy().to_string();

        let mounted = async {
            probed_format(&device_path, &filesystem.name)
                .await
                .map_err(|err| {
                    Status::internal(format!(
                        "Failed to format volume {}: {}",
                        volume_id, err
                    ))
                })?;
            mount::mount_fs(
                &device_path,
                target,
                &filesystem.name,
                mount_flags,
                readonly,
            )
            .map_err(|err| {
                Status::internal(format!(
                    "Failed to mount volume {} on {}: {}",
                    volume_id, target, err
                ))
            })
        }
        .await;

        // the scratch device node is no longer needed once the mount
        // holds the device open, and certainly not after a failure
        if let Some(cleanup) = device.cleanup {
            cleanup();
        }

        match mounted {
            Ok(()) => {
                info!(volume = volume_id, target, "volume mounted");
                Ok(())
            }
            Err(status) => {
                if let Err(err) = self.backend.delete_device(volume_id).await
                {
                    error!(
                        "Failed to unwind device of volume {}: {}",
                        volume_id, err
                    );
                }
                if created_dir {
                    let _ = std::fs::remove_dir(target);
                }
                Err(status)
            }
        }
    }

    /// Unmount the target if it is mounted; a target that is not mounted
    /// is tolerated and treated as success.
    fn unmount_target(
        &self,
        volume_id: &str,
        target: &str,
    ) -> Result<(), Status> {
        match mount::match_mount(None, Some(target))
            .map_err(|err| Status::internal(err.to_string()))?
        {
            Some(_) => mount::unmount_fs(target).map_err(|err| {
                Status::internal(format!(
                    "Failed to unmount volume {} at {}: {}",
                    volume_id, target, err
                ))
            }),
            None => {
                debug!(volume = volume_id, target, "was not mounted");
                Ok(())
            }
        }
    }
}

fn device_request(
    volume_id: &str,
    staging_path: &str,
    publish_context: &HashMap<String, String>,
    volume_context: &HashMap<String, String>,
    secrets: &HashMap<String, String>,
) -> DeviceRequest {
    // storage class parameters arrive as volume context; publish context
    // entries from the controller override on conflict
    let mut parameters = volume_context.clone();
    parameters.extend(
        publish_context
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    DeviceRequest {
        volume_id: volume_id.to_string(),
        staging_path: staging_path.to_string(),
        parameters,
        secrets: secrets.clone(),
        volume_context: volume_context.clone(),
    }
}

#[tonic::async_trait]
impl rpc::csi::node_server::Node for Node {
    /// Grab a device for the volume, format it if needed and mount it on
    /// the staging path. This operation MUST be idempotent: if the volume
    /// is already staged to the staging_target_path we reply OK.
    async fn node_stage_volume(
        &self,
        request: Request<NodeStageVolumeRequest>,
    ) -> Result<Response<NodeStageVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() || msg.staging_target_path.is_empty() {
            return Err(Status::invalid_argument(
                "Invalid target path or volume id",
            ));
        }
        if msg.volume_capability.is_none() {
            return Err(Status::invalid_argument(format!(
                "No volume capabilities provided for {}",
                msg.volume_id
            )));
        }
        let mnt = mount_capability(&msg.volume_id, &msg.volume_capability)?;
        // relax the check a bit by pretending all stage mounts are ro
        if let Err(reason) = check_access_mode(
            &msg.volume_id,
            &msg.volume_capability.as_ref().unwrap().access_mode,
            true,
        ) {
            return Err(Status::invalid_argument(reason));
        }
        let filesystem = self.select_filesystem(&mnt.fs_type)?;
        let mut flags = mnt.mount_flags.clone();
        let readonly = flags.iter().any(|flag| flag == "ro");
        flags.retain(|flag| flag != "ro" && flag != "rw");
        flags.extend(filesystem.defaults.clone());

        debug!(volume = %msg.volume_id, target = %msg.staging_target_path,
               "staging");
        let _guard = self.locks.lock(&msg.volume_id).await;
        let device_request = device_request(
            &msg.volume_id,
            &msg.staging_target_path,
            &msg.publish_context,
            &msg.volume_context,
            &msg.secrets,
        );
        self.stage_device(
            &device_request,
            &msg.staging_target_path,
            &filesystem,
            &flags,
            readonly,
        )
        .await?;
        Ok(Response::new(NodeStageVolumeResponse {}))
    }

    /// Reverse of NodeStageVolume. This operation MUST be idempotent: an
    /// unstaged volume unmounts nothing and tears down whatever device
    /// state is left.
    async fn node_unstage_volume(
        &self,
        request: Request<NodeUnstageVolumeRequest>,
    ) -> Result<Response<NodeUnstageVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() || msg.staging_target_path.is_empty() {
            return Err(Status::invalid_argument(
                "Invalid target path or volume id",
            ));
        }

        debug!(volume = %msg.volume_id, target = %msg.staging_target_path,
               "unstaging");
        let _guard = self.locks.lock(&msg.volume_id).await;
        self.unmount_target(&msg.volume_id, &msg.staging_target_path)?;
        // failing to tear down back-end state after a successful unmount
        // is still a failure of the whole operation
        self.backend
            .delete_device(&msg.volume_id)
            .await
            .map_err(|err| err.into_status())?;
        info!(volume = %msg.volume_id, "unstaged");
        Ok(Response::new(NodeUnstageVolumeResponse {}))
    }

    /// Called when a workload using the volume is placed on this node.
    /// With a staging path the staged filesystem is bind mounted onto the
    /// target; without one the full device pipeline runs against the
    /// target directly. Idempotent for the same target path.
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() || msg.target_path.is_empty() {
            return Err(Status::invalid_argument(
                "Invalid target path or volume id",
            ));
        }
        if msg.volume_capability.is_none() {
            return Err(Status::invalid_argument(format!(
                "No volume capabilities provided for {}",
                msg.volume_id
            )));
        }
        let mnt = mount_capability(&msg.volume_id, &msg.volume_capability)?;
        if let Err(reason) = check_access_mode(
            &msg.volume_id,
            &msg.volume_capability.as_ref().unwrap().access_mode,
            msg.readonly,
        ) {
            return Err(Status::invalid_argument(reason));
        }

        let _guard = self.locks.lock(&msg.volume_id).await;

        if !msg.staging_target_path.is_empty() {
            // apparently it does not matter what the source device is,
            // only that the staging path is mounted at all
            if mount::match_mount(None, Some(&msg.staging_target_path))
                .map_err(|err| Status::internal(err.to_string()))?
                .is_none()
            {
                return Err(Status::invalid_argument(format!(
                    "No mount {} for volume {} (hint: volume unstaged?)",
                    msg.staging_target_path, msg.volume_id
                )));
            }
            if mount::match_mount(None, Some(&msg.target_path))
                .map_err(|err| Status::internal(err.to_string()))?
                .is_some()
            {
                info!(volume = %msg.volume_id, "already published");
                return Ok(Response::new(NodePublishVolumeResponse {}));
            }
            let created_dir = prepare_target(&msg.target_path)?;
            if let Err(err) = mount::bind_mount(
                &msg.staging_target_path,
                &msg.target_path,
                msg.readonly,
            ) {
                if created_dir {
                    let _ = std::fs::remove_dir(&msg.target_path);
                }
                return Err(Status::internal(format!(
                    "Failed to publish volume {}: {}",
                    msg.volume_id, err
                )));
            }
        } else {
            let filesystem = self.select_filesystem(&mnt.fs_type)?;
            let mut flags = mnt.mount_flags.clone();
            flags.retain(|flag| flag != "ro" && flag != "rw");
            flags.extend(filesystem.defaults.clone());
            let device_request = device_request(
                &msg.volume_id,
                &msg.target_path,
                &msg.publish_context,
                &msg.volume_context,
                &msg.secrets,
            );
            self.stage_device(
                &device_request,
                &msg.target_path,
                &filesystem,
                &flags,
                msg.readonly,
            )
            .await?;
            self.unstaged_publishes
                .lock()
                .unwrap()
                .insert(msg.volume_id.clone());
        }
        info!(volume = %msg.volume_id, target = %msg.target_path,
              "published");
        Ok(Response::new(NodePublishVolumeResponse {}))
    }

    /// Reverse of NodePublishVolume. This operation MUST be idempotent;
    /// an unmounted target is tolerated. When the device was created by a
    /// publish without staging, it is torn down here as well.
    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        let msg = request.into_inner();
        if msg.volume_id.is_empty() || msg.target_path.is_empty() {
            return Err(Status::invalid_argument(
                "Invalid target path or volume id",
            ));
        }

        let _guard = self.locks.lock(&msg.volume_id).await;
        self.unmount_target(&msg.volume_id, &msg.target_path)?;

        let owns_device = self
            .unstaged_publishes
            .lock()
            .unwrap()
            .contains(&msg.volume_id);
        if owns_device {
            self.backend
                .delete_device(&msg.volume_id)
                .await
                .map_err(|err| err.into_status())?;
            self.unstaged_publishes
                .lock()
                .unwrap()
                .remove(&msg.volume_id);
        }
        let _ = std::fs::remove_dir(&msg.target_path);
        info!(volume = %msg.volume_id, target = %msg.target_path,
              "unpublished");
        Ok(Response::new(NodeUnpublishVolumeResponse {}))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        Ok(Response::new(NodeGetCapabilitiesResponse {
            capabilities: vec![NodeServiceCapability {
                r#type: Some(node_service_capability::Type::Rpc(
                    node_service_capability::Rpc {
                        r#type:
                            node_service_capability::rpc::Type::
                                StageUnstageVolume as i32,
                    },
                )),
            }],
        }))
    }

    async fn node_get_info(
        &self,
        _request: Request<NodeGetInfoRequest>,
    ) -> Result<Response<NodeGetInfoResponse>, Status> {
        debug!(node = %self.node_id, "NodeGetInfo");
        Ok(Response::new(NodeGetInfoResponse {
            node_id: self.node_id.clone(),
            // no static limit; free nbd slots and scsi targets vary
            max_volumes_per_node: 0,
            accessible_topology: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::MockBackend;
    use rpc::csi::{
        node_server::Node as NodeRpc,
        volume_capability::{access_mode::Mode, AccessMode, AccessType},
    };

    fn node() -> Node {
        Node::new(
            "node-1".to_string(),
            Arc::new(MockBackend::default()),
            Arc::new(VolumeLocks::new()),
        )
    }

    fn capability(mode: Mode) -> Option<VolumeCapability> {
        Some(VolumeCapability {
            access_type: Some(AccessType::Mount(MountVolume {
                fs_type: String::new(),
                mount_flags: vec![],
            })),
            access_mode: Some(AccessMode { mode: mode as i32 }),
        })
    }

    #[tokio::test]
    async fn stage_validates_arguments() {
        let node = node();

        let err = node
            .node_stage_volume(Request::new(NodeStageVolumeRequest {
                volume_id: String::new(),
                staging_target_path: "/tmp/x".to_string(),
                volume_capability: capability(Mode::SingleNodeWriter),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);

        let err = node
            .node_stage_volume(Request::new(NodeStageVolumeRequest {
                volume_id: "vol".to_string(),
                staging_target_path: "/tmp/x".to_string(),
                volume_capability: None,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn stage_rejects_block_volumes() {
        let node = node();
        let err = node
            .node_stage_volume(Request::new(NodeStageVolumeRequest {
                volume_id: "vol".to_string(),
                staging_target_path: "/tmp/x".to_string(),
                volume_capability: Some(VolumeCapability {
                    access_type: Some(AccessType::Block(Default::default())),
                    access_mode: Some(AccessMode {
                        mode: Mode::SingleNodeWriter as i32,
                    }),
                }),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn publish_checks_access_mode_against_ro_flag() {
        let node = node();
        // reader-only access mode but a read-write publish
        let err = node
            .node_publish_volume(Request::new(NodePublishVolumeRequest {
                volume_id: "vol".to_string(),
                target_path: "/tmp/x".to_string(),
                volume_capability: capability(Mode::SingleNodeReaderOnly),
                readonly: false,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn publish_requires_staged_mount() {
        let node = node();
        let err = node
            .node_publish_volume(Request::new(NodePublishVolumeRequest {
                volume_id: "vol".to_string(),
                staging_target_path: "/definitely/not/mounted".to_string(),
                target_path: "/tmp/x".to_string(),
                volume_capability: capability(Mode::SingleNodeWriter),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
        assert!(err.message().contains("unstaged"));
    }

    #[tokio::test]
    async fn unpublish_tolerates_unmounted_target() {
        let node = node();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();

        node.node_unpublish_volume(Request::new(
            NodeUnpublishVolumeRequest {
                volume_id: "vol".to_string(),
                target_path: target.to_string_lossy().to_string(),
            },
        ))
        .await
        .unwrap();
    }
}
