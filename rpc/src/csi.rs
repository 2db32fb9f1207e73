//! The subset of the CSI v1 protocol the driver implements. Message shapes
//! and tags follow csi.proto; fields of methods outside the driver's
//! capability set are not mirrored here, and calls to such methods answer
//! UNIMPLEMENTED through the router fallback.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub vendor_version: String,
    #[prost(map = "string, string", tag = "3")]
    pub manifest: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<PluginCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginCapability {
    #[prost(oneof = "plugin_capability::Type", tags = "1")]
    pub r#type: Option<plugin_capability::Type>,
}

pub mod plugin_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Service {
        #[prost(enumeration = "service::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod service {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            ControllerService = 1,
            VolumeAccessibilityConstraints = 2,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Service(Service),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeResponse {
    /// google.protobuf.BoolValue
    #[prost(message, optional, tag = "1")]
    pub ready: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CapacityRange {
    #[prost(int64, tag = "1")]
    pub required_bytes: i64,
    #[prost(int64, tag = "2")]
    pub limit_bytes: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeCapability {
    #[prost(oneof = "volume_capability::AccessType", tags = "1, 2")]
    pub access_type: Option<volume_capability::AccessType>,
    #[prost(message, optional, tag = "3")]
    pub access_mode: Option<volume_capability::AccessMode>,
}

pub mod volume_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockVolume {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MountVolume {
        #[prost(string, tag = "1")]
        pub fs_type: String,
        #[prost(string, repeated, tag = "2")]
        pub mount_flags: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AccessMode {
        #[prost(enumeration = "access_mode::Mode", tag = "1")]
        pub mode: i32,
    }

    pub mod access_mode {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Mode {
            Unknown = 0,
            SingleNodeWriter = 1,
            SingleNodeReaderOnly = 2,
            MultiNodeReaderOnly = 3,
            MultiNodeSingleWriter = 4,
            MultiNodeMultiWriter = 5,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum AccessType {
        #[prost(message, tag = "1")]
        Block(BlockVolume),
        #[prost(message, tag = "2")]
        Mount(MountVolume),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Topology {
    #[prost(map = "string, string", tag = "1")]
    pub segments: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopologyRequirement {
    #[prost(message, repeated, tag = "1")]
    pub requisite: Vec<Topology>,
    #[prost(message, repeated, tag = "2")]
    pub preferred: Vec<Topology>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeContentSource {
    #[prost(oneof = "volume_content_source::Type", tags = "1, 2")]
    pub r#type: Option<volume_content_source::Type>,
}

pub mod volume_content_source {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SnapshotSource {
        #[prost(string, tag = "1")]
        pub snapshot_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VolumeSource {
        #[prost(string, tag = "1")]
        pub volume_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Snapshot(SnapshotSource),
        #[prost(message, tag = "2")]
        Volume(VolumeSource),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub capacity_range: Option<CapacityRange>,
    #[prost(message, repeated, tag = "3")]
    pub volume_capabilities: Vec<VolumeCapability>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
    #[prost(message, optional, tag = "6")]
    pub volume_content_source: Option<VolumeContentSource>,
    #[prost(message, optional, tag = "7")]
    pub accessibility_requirements: Option<TopologyRequirement>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Volume {
    #[prost(int64, tag = "1")]
    pub capacity_bytes: i64,
    #[prost(string, tag = "2")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "3")]
    pub volume_context: HashMap<String, String>,
    #[prost(message, optional, tag = "4")]
    pub content_source: Option<VolumeContentSource>,
    #[prost(message, repeated, tag = "5")]
    pub accessible_topology: Vec<Topology>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeResponse {
    #[prost(message, optional, tag = "1")]
    pub volume: Option<Volume>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub volume_context: HashMap<String, String>,
    #[prost(message, repeated, tag = "3")]
    pub volume_capabilities: Vec<VolumeCapability>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesResponse {
    #[prost(message, optional, tag = "1")]
    pub confirmed: Option<validate_volume_capabilities_response::Confirmed>,
    #[prost(string, tag = "2")]
    pub message: String,
}

pub mod validate_volume_capabilities_response {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Confirmed {
        #[prost(map = "string, string", tag = "1")]
        pub volume_context: HashMap<String, String>,
        #[prost(message, repeated, tag = "2")]
        pub volume_capabilities: Vec<VolumeCapability>,
        #[prost(map = "string, string", tag = "3")]
        pub parameters: HashMap<String, String>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<ControllerServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerServiceCapability {
    #[prost(oneof = "controller_service_capability::Type", tags = "1")]
    pub r#type: Option<controller_service_capability::Type>,
}

pub mod controller_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            CreateDeleteVolume = 1,
            PublishUnpublishVolume = 2,
            ListVolumes = 3,
            GetCapacity = 4,
            CreateDeleteSnapshot = 5,
            ListSnapshots = 6,
            CloneVolume = 7,
            PublishReadonly = 8,
            ExpandVolume = 9,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Rpc(Rpc),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeStageVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub publish_context: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub staging_target_path: String,
    #[prost(message, optional, tag = "4")]
    pub volume_capability: Option<VolumeCapability>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "6")]
    pub volume_context: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeStageVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnstageVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(string, tag = "2")]
    pub staging_target_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnstageVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub publish_context: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub staging_target_path: String,
    #[prost(string, tag = "4")]
    pub target_path: String,
    #[prost(message, optional, tag = "5")]
    pub volume_capability: Option<VolumeCapability>,
    #[prost(bool, tag = "6")]
    pub readonly: bool,
    #[prost(map = "string, string", tag = "7")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "8")]
    pub volume_context: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(string, tag = "2")]
    pub target_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<NodeServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeServiceCapability {
    #[prost(oneof = "node_service_capability::Type", tags = "1")]
    pub r#type: Option<node_service_capability::Type>,
}

pub mod node_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            StageUnstageVolume = 1,
            GetVolumeStats = 2,
            ExpandVolume = 3,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Rpc(Rpc),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetInfoResponse {
    #[prost(string, tag = "1")]
    pub node_id: String,
    #[prost(int64, tag = "2")]
    pub max_volumes_per_node: i64,
    #[prost(message, optional, tag = "3")]
    pub accessible_topology: Option<Topology>,
}

pub mod identity_server {
    use super::*;
    use crate::unary;
    use std::{
        sync::Arc,
        task::{Context, Poll},
    };

    #[tonic::async_trait]
    pub trait Identity: Send + Sync + 'static {
        async fn get_plugin_info(
            &self,
            request: tonic::Request<GetPluginInfoRequest>,
        ) -> Result<tonic::Response<GetPluginInfoResponse>, tonic::Status>;
        async fn get_plugin_capabilities(
            &self,
            request: tonic::Request<GetPluginCapabilitiesRequest>,
        ) -> Result<tonic::Response<GetPluginCapabilitiesResponse>, tonic::Status>;
        async fn probe(
            &self,
            request: tonic::Request<ProbeRequest>,
        ) -> Result<tonic::Response<ProbeResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct IdentityServer<T: Identity> {
        inner: Arc<T>,
    }

    impl<T: Identity> IdentityServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T: Identity> Clone for IdentityServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> tower::Service<http::Request<B>> for IdentityServer<T>
    where
        T: Identity,
        B: http_body::Body + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = crate::BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/csi.v1.Identity/GetPluginInfo" => unary!(
                    Identity,
                    inner,
                    req,
                    GetPluginInfoRequest,
                    GetPluginInfoResponse,
                    get_plugin_info
                ),
                "/csi.v1.Identity/GetPluginCapabilities" => unary!(
                    Identity,
                    inner,
                    req,
                    GetPluginCapabilitiesRequest,
                    GetPluginCapabilitiesResponse,
                    get_plugin_capabilities
                ),
                "/csi.v1.Identity/Probe" => unary!(
                    Identity,
                    inner,
                    req,
                    ProbeRequest,
                    ProbeResponse,
                    probe
                ),
                _ => Box::pin(async move { Ok(crate::unimplemented_response()) }),
            }
        }
    }

    impl<T: Identity> tonic::server::NamedService for IdentityServer<T> {
        const NAME: &'static str = "csi.v1.Identity";
    }
}

pub mod controller_server {
    use super::*;
    use crate::unary;
    use std::{
        sync::Arc,
        task::{Context, Poll},
    };

    #[tonic::async_trait]
    pub trait Controller: Send + Sync + 'static {
        async fn create_volume(
            &self,
            request: tonic::Request<CreateVolumeRequest>,
        ) -> Result<tonic::Response<CreateVolumeResponse>, tonic::Status>;
        async fn delete_volume(
            &self,
            request: tonic::Request<DeleteVolumeRequest>,
        ) -> Result<tonic::Response<DeleteVolumeResponse>, tonic::Status>;
        async fn validate_volume_capabilities(
            &self,
            request: tonic::Request<ValidateVolumeCapabilitiesRequest>,
        ) -> Result<
            tonic::Response<ValidateVolumeCapabilitiesResponse>,
            tonic::Status,
        >;
        async fn controller_get_capabilities(
            &self,
            request: tonic::Request<ControllerGetCapabilitiesRequest>,
        ) -> Result<
            tonic::Response<ControllerGetCapabilitiesResponse>,
            tonic::Status,
        >;
    }

    #[derive(Debug)]
    pub struct ControllerServer<T: Controller> {
        inner: Arc<T>,
    }

    impl<T: Controller> ControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T: Controller> Clone for ControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> tower::Service<http::Request<B>> for ControllerServer<T>
    where
        T: Controller,
        B: http_body::Body + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = crate::BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/csi.v1.Controller/CreateVolume" => unary!(
                    Controller,
                    inner,
                    req,
                    CreateVolumeRequest,
                    CreateVolumeResponse,
                    create_volume
                ),
                "/csi.v1.Controller/DeleteVolume" => unary!(
                    Controller,
                    inner,
                    req,
                    DeleteVolumeRequest,
                    DeleteVolumeResponse,
                    delete_volume
                ),
                "/csi.v1.Controller/ValidateVolumeCapabilities" => unary!(
                    Controller,
                    inner,
                    req,
                    ValidateVolumeCapabilitiesRequest,
                    ValidateVolumeCapabilitiesResponse,
                    validate_volume_capabilities
                ),
                "/csi.v1.Controller/ControllerGetCapabilities" => unary!(
                    Controller,
                    inner,
                    req,
                    ControllerGetCapabilitiesRequest,
                    ControllerGetCapabilitiesResponse,
                    controller_get_capabilities
                ),
                _ => Box::pin(async move { Ok(crate::unimplemented_response()) }),
            }
        }
    }

    impl<T: Controller> tonic::server::NamedService for ControllerServer<T> {
        const NAME: &'static str = "csi.v1.Controller";
    }
}

pub mod node_server {
    use super::*;
    use crate::unary;
    use std::{
        sync::Arc,
        task::{Context, Poll},
    };

    #[tonic::async_trait]
    pub trait Node: Send + Sync + 'static {
        async fn node_stage_volume(
            &self,
            request: tonic::Request<NodeStageVolumeRequest>,
        ) -> Result<tonic::Response<NodeStageVolumeResponse>, tonic::Status>;
        async fn node_unstage_volume(
            &self,
            request: tonic::Request<NodeUnstageVolumeRequest>,
        ) -> Result<tonic::Response<NodeUnstageVolumeResponse>, tonic::Status>;
        async fn node_publish_volume(
            &self,
            request: tonic::Request<NodePublishVolumeRequest>,
        ) -> Result<tonic::Response<NodePublishVolumeResponse>, tonic::Status>;
        async fn node_unpublish_volume(
            &self,
            request: tonic::Request<NodeUnpublishVolumeRequest>,
        ) -> Result<tonic::Response<NodeUnpublishVolumeResponse>, tonic::Status>;
        async fn node_get_capabilities(
            &self,
            request: tonic::Request<NodeGetCapabilitiesRequest>,
        ) -> Result<tonic::Response<NodeGetCapabilitiesResponse>, tonic::Status>;
        async fn node_get_info(
            &self,
            request: tonic::Request<NodeGetInfoRequest>,
        ) -> Result<tonic::Response<NodeGetInfoResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct NodeServer<T: Node> {
        inner: Arc<T>,
    }

    impl<T: Node> NodeServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T: Node> Clone for NodeServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> tower::Service<http::Request<B>> for NodeServer<T>
    where
        T: Node,
        B: http_body::Body + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = crate::BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/csi.v1.Node/NodeStageVolume" => unary!(
                    Node,
                    inner,
                    req,
                    NodeStageVolumeRequest,
                    NodeStageVolumeResponse,
                    node_stage_volume
                ),
                "/csi.v1.Node/NodeUnstageVolume" => unary!(
                    Node,
                    inner,
                    req,
                    NodeUnstageVolumeRequest,
                    NodeUnstageVolumeResponse,
                    node_unstage_volume
                ),
                "/csi.v1.Node/NodePublishVolume" => unary!(
                    Node,
                    inner,
                    req,
                    NodePublishVolumeRequest,
                    NodePublishVolumeResponse,
                    node_publish_volume
                ),
                "/csi.v1.Node/NodeUnpublishVolume" => unary!(
                    Node,
                    inner,
                    req,
                    NodeUnpublishVolumeRequest,
                    NodeUnpublishVolumeResponse,
                    node_unpublish_volume
                ),
                "/csi.v1.Node/NodeGetCapabilities" => unary!(
                    Node,
                    inner,
                    req,
                    NodeGetCapabilitiesRequest,
                    NodeGetCapabilitiesResponse,
                    node_get_capabilities
                ),
                "/csi.v1.Node/NodeGetInfo" => unary!(
                    Node,
                    inner,
                    req,
                    NodeGetInfoRequest,
                    NodeGetInfoResponse,
                    node_get_info
                ),
                _ => Box::pin(async move { Ok(crate::unimplemented_response()) }),
            }
        }
    }

    impl<T: Node> tonic::server::NamedService for NodeServer<T> {
        const NAME: &'static str = "csi.v1.Node";
    }
}
