//! The `oxbow.v0` wire surface: the registry key/value service and the
//! per-machine controller service reached through the registry proxy.

/// Method prefix of the registry's own service. Everything else arriving at
/// the registry listener is proxied to a controller.
pub const REGISTRY_SERVICE_PREFIX: &str = "/oxbow.v0.Registry/";

/// Metadata key carrying the controller id that selects the proxy target.
pub const CONTROLLER_ID_KEY: &str = "controllerid";

/// Reserved leaf under `<controller-id>/` holding the controller endpoint.
pub const ADDRESS_LEAF: &str = "address";

/// Reserved leaf under `<controller-id>/` holding the default PCI address
/// of the controller's devices.
pub const PCI_LEAF: &str = "pci";

/// One registry entry. An empty `value` on SetValue deletes the entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    /// Hierarchical `/`-separated path, canonicalised by the server.
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetValueRequest {
    #[prost(message, optional, tag = "1")]
    pub value: Option<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetValueReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetValuesRequest {
    /// Path prefix. Empty returns every entry.
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetValuesReply {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<Value>,
}

/// Parameters for backing a volume with an in-memory malloc bdev. The bdev
/// itself is provisioned separately (ProvisionMallocBdev), so mapping needs
/// no further detail.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MallocParams {}

/// Parameters for backing a volume with a Ceph RBD image.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CephParams {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub secret: String,
    #[prost(string, repeated, tag = "3")]
    pub monitors: Vec<String>,
    #[prost(string, tag = "4")]
    pub pool: String,
    #[prost(string, tag = "5")]
    pub image: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(oneof = "map_volume_request::Params", tags = "2, 3")]
    pub params: Option<map_volume_request::Params>,
}

pub mod map_volume_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Params {
        #[prost(message, tag = "2")]
        Malloc(super::MallocParams),
        #[prost(message, tag = "3")]
        Ceph(super::CephParams),
    }
}

/// SCSI coordinates of a mapped disk behind a virtio-SCSI function.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScsiDisk {
    #[prost(uint32, tag = "1")]
    pub target: u32,
    #[prost(uint32, tag = "2")]
    pub lun: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapVolumeReply {
    /// Extended BDF string, possibly with unspecified fields left empty.
    /// The caller merges it with the default stored under `<id>/pci`.
    #[prost(string, tag = "1")]
    pub pci_address: String,
    #[prost(message, optional, tag = "2")]
    pub scsi_disk: Option<ScsiDisk>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnmapVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnmapVolumeReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionMallocBdevRequest {
    #[prost(string, tag = "1")]
    pub bdev_name: String,
    /// Requested size in bytes. Zero deletes the bdev.
    #[prost(int64, tag = "2")]
    pub size: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionMallocBdevReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckMallocBdevRequest {
    #[prost(string, tag = "1")]
    pub bdev_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckMallocBdevReply {}

pub mod registry_server {
    use super::*;
    use crate::unary;
    use std::{
        sync::Arc,
        task::{Context, Poll},
    };

    #[tonic::async_trait]
    pub trait Registry: Send + Sync + 'static {
        async fn set_value(
            &self,
            request: tonic::Request<SetValueRequest>,
        ) -> Result<tonic::Response<SetValueReply>, tonic::Status>;
        async fn get_values(
            &self,
            request: tonic::Request<GetValuesRequest>,
        ) -> Result<tonic::Response<GetValuesReply>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct RegistryServer<T: Registry> {
        inner: Arc<T>,
    }

    impl<T: Registry> RegistryServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T: Registry> Clone for RegistryServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> tower::Service<http::Request<B>> for RegistryServer<T>
    where
        T: Registry,
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
                "/oxbow.v0.Registry/SetValue" => unary!(
                    Registry,
                    inner,
                    req,
                    SetValueRequest,
                    SetValueReply,
                    set_value
                ),
                "/oxbow.v0.Registry/GetValues" => unary!(
                    Registry,
                    inner,
                    req,
                    GetValuesRequest,
                    GetValuesReply,
                    get_values
                ),
                _ => Box::pin(async move { Ok(crate::unimplemented_response()) }),
            }
        }
    }

    impl<T: Registry> tonic::server::NamedService for RegistryServer<T> {
        const NAME: &'static str = "oxbow.v0.Registry";
    }
}

pub mod registry_client {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct RegistryClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> RegistryClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        T::ResponseBody: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        <T::ResponseBody as http_body::Body>::Error:
            Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    {
        pub fn new(inner: T) -> Self {
            Self {
                inner: tonic::client::Grpc::new(inner),
            }
        }

        pub async fn set_value(
            &mut self,
            request: impl tonic::IntoRequest<SetValueRequest>,
        ) -> Result<tonic::Response<SetValueReply>, tonic::Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Registry/SetValue",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        pub async fn get_values(
            &mut self,
            request: impl tonic::IntoRequest<GetValuesRequest>,
        ) -> Result<tonic::Response<GetValuesReply>, tonic::Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Registry/GetValues",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        async fn ready(&mut self) -> Result<(), tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!(
                    "Service was not ready: {}",
                    e.into()
                ))
            })
        }
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
        async fn map_volume(
            &self,
            request: tonic::Request<MapVolumeRequest>,
        ) -> Result<tonic::Response<MapVolumeReply>, tonic::Status>;
        async fn unmap_volume(
            &self,
            request: tonic::Request<UnmapVolumeRequest>,
        ) -> Result<tonic::Response<UnmapVolumeReply>, tonic::Status>;
        async fn provision_malloc_bdev(
            &self,
            request: tonic::Request<ProvisionMallocBdevRequest>,
        ) -> Result<tonic::Response<ProvisionMallocBdevReply>, tonic::Status>;
        async fn check_malloc_bdev(
            &self,
            request: tonic::Request<CheckMallocBdevRequest>,
        ) -> Result<tonic::Response<CheckMallocBdevReply>, tonic::Status>;
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
                "/oxbow.v0.Controller/MapVolume" => unary!(
                    Controller,
                    inner,
                    req,
                    MapVolumeRequest,
                    MapVolumeReply,
                    map_volume
                ),
                "/oxbow.v0.Controller/UnmapVolume" => unary!(
                    Controller,
                    inner,
                    req,
                    UnmapVolumeRequest,
                    UnmapVolumeReply,
                    unmap_volume
                ),
                "/oxbow.v0.Controller/ProvisionMallocBdev" => unary!(
                    Controller,
                    inner,
                    req,
                    ProvisionMallocBdevRequest,
                    ProvisionMallocBdevReply,
                    provision_malloc_bdev
                ),
                "/oxbow.v0.Controller/CheckMallocBdev" => unary!(
                    Controller,
                    inner,
                    req,
                    CheckMallocBdevRequest,
                    CheckMallocBdevReply,
                    check_malloc_bdev
                ),
                _ => Box::pin(async move { Ok(crate::unimplemented_response()) }),
            }
        }
    }

    impl<T: Controller> tonic::server::NamedService for ControllerServer<T> {
        const NAME: &'static str = "oxbow.v0.Controller";
    }
}

pub mod controller_client {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct ControllerClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> ControllerClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        T::ResponseBody: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        <T::ResponseBody as http_body::Body>::Error:
            Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    {
        pub fn new(inner: T) -> Self {
            Self {
                inner: tonic::client::Grpc::new(inner),
            }
        }

        pub async fn map_volume(
            &mut self,
            request: impl tonic::IntoRequest<MapVolumeRequest>,
        ) -> Result<tonic::Response<MapVolumeReply>, tonic::Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Controller/MapVolume",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        pub async fn unmap_volume(
            &mut self,
            request: impl tonic::IntoRequest<UnmapVolumeRequest>,
        ) -> Result<tonic::Response<UnmapVolumeReply>, tonic::Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Controller/UnmapVolume",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        pub async fn provision_malloc_bdev(
            &mut self,
            request: impl tonic::IntoRequest<ProvisionMallocBdevRequest>,
        ) -> Result<tonic::Response<ProvisionMallocBdevReply>, tonic::Status>
        {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Controller/ProvisionMallocBdev",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        pub async fn check_malloc_bdev(
            &mut self,
            request: impl tonic::IntoRequest<CheckMallocBdevRequest>,
        ) -> Result<tonic::Response<CheckMallocBdevReply>, tonic::Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    http::uri::PathAndQuery::from_static(
                        "/oxbow.v0.Controller/CheckMallocBdev",
                    ),
                    tonic::codec::ProstCodec::default(),
                )
                .await
        }

        async fn ready(&mut self) -> Result<(), tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!(
                    "Service was not ready: {}",
                    e.into()
                ))
            })
        }
    }
}
