//! Transparent forwarding of controller RPCs.
//!
//! Any method outside the registry's own service namespace is relayed to
//! the controller named by the `controllerid` request metadata. The relay
//! works on the raw HTTP/2 request and response bodies, so message payloads
//! pass through byte-identical and in order, headers and trailers included,
//! and cancelling the inbound call tears down the outbound stream.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use common::endpoint::Dialer;
use http_body::Body;
use rpc::v0::{ADDRESS_LEAF, CONTROLLER_ID_KEY, REGISTRY_SERVICE_PREFIX};
use tonic::{body::BoxBody, transport::Channel, Status};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::store::Store;

/// Wraps the registry's service router with the forwarding fallback.
#[derive(Debug, Clone)]
pub struct ProxyLayer {
    store: Store,
    dialer: Dialer,
}

impl ProxyLayer {
    pub fn new(store: Store, dialer: Dialer) -> Self {
        Self { store, dialer }
    }
}

impl<S> Layer<S> for ProxyLayer {
    type Service = Proxy<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Proxy {
            inner,
            store: self.store.clone(),
            dialer: self.dialer.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Proxy<S> {
    inner: S,
    store: Store,
    dialer: Dialer,
}

impl<S, ResBody> Service<http::Request<hyper::Body>> for Proxy<S>
where
    S: Service<
            http::Request<hyper::Body>,
            Response = http::Response<ResBody>,
        > + Clone
        + Send
        + 'static,
    S::Error: Send,
    S::Future: Send + 'static,
    ResBody: http_body::Body<Data = bytes::Bytes> + Send + 'static,
    ResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = http::Response<BoxBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<hyper::Body>) -> Self::Future {
        if req.uri().path().starts_with(REGISTRY_SERVICE_PREFIX) {
            let served = self.inner.call(req);
            return Box::pin(async move {
                let response = served.await?;
                Ok(response.map(|body| {
                    body.map_err(|err| {
                        Status::internal(err.into().to_string())
                    })
                    .boxed_unsync()
                }))
            });
        }
        let store = self.store.clone();
        let dialer = self.dialer.clone();
        Box::pin(async move {
            Ok(forward(store, dialer, req)
                .await
                .unwrap_or_else(|status| status_response(&status)))
        })
    }
}

/// Relay one call to the controller selected by its metadata.
async fn forward(
    store: Store,
    dialer: Dialer,
    req: http::Request<hyper::Body>,
) -> Result<http::Response<BoxBody>, Status> {
    let controller_id = req
        .headers()
        .get(CONTROLLER_ID_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            Status::unimplemented(format!(
                "{} not found or no metadata",
                CONTROLLER_ID_KEY
            ))
        })?;

    let address =
        store.lookup(&format!("{}/{}", controller_id, ADDRESS_LEAF));
    if address.is_empty() {
        return Err(Status::unavailable(format!(
            "{}: no address registered",
            controller_id
        )));
    }
    debug!(
        controller = %controller_id,
        address = %address,
        method = %req.uri().path(),
        "forwarding",
    );

    let mut channel: Channel =
        dialer.dial(&address).await.map_err(|err| {
            Status::internal(format!(
                "connecting to {} at {}: {}",
                controller_id, address, err
            ))
        })?;

    // outbound request: same method path, same headers (controllerid
    // included), the body passed through untouched
    let req = req.map(|body| {
        body.map_err(|err| Status::internal(err.to_string()))
            .boxed_unsync()
    });

    std::future::poll_fn(|cx| channel.poll_ready(cx))
        .await
        .map_err(|err| Status::internal(err.to_string()))?;
    let response = channel
        .call(req)
        .await
        .map_err(|err| Status::internal(err.to_string()))?;

    Ok(response.map(|body| {
        body.map_err(|err| Status::internal(err.to_string()))
            .boxed_unsync()
    }))
}

/// Immediate grpc error reply, delivered in the response headers the way
/// tonic does for calls that fail before a stream opens.
fn status_response(status: &Status) -> http::Response<BoxBody> {
    let mut builder = http::Response::builder()
        .status(http::StatusCode::OK)
        .header("content-type", "application/grpc")
        .header("grpc-status", (status.code() as i32).to_string());
    match http::HeaderValue::from_str(status.message()) {
        Ok(message) => builder = builder.header("grpc-message", message),
        Err(_) => warn!("Dropping unencodable status message"),
    }
    builder.body(tonic::body::empty_body()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::RegistryService;
    use rpc::v0::{
        controller_client::ControllerClient, controller_server::Controller,
        controller_server::ControllerServer, registry_client::RegistryClient,
        registry_server::RegistryServer, CheckMallocBdevReply,
        CheckMallocBdevRequest, GetValuesRequest, MapVolumeReply,
        MapVolumeRequest, ProvisionMallocBdevReply,
        ProvisionMallocBdevRequest, ScsiDisk, SetValueRequest,
        UnmapVolumeReply, UnmapVolumeRequest, Value,
    };
    use std::path::Path;
    use tokio::net::UnixListener;
    use tokio_stream::wrappers::UnixListenerStream;
    use tonic::transport::Server;

    struct FakeController;

    #[tonic::async_trait]
    impl Controller for FakeController {
        async fn map_volume(
            &self,
            request: tonic::Request<MapVolumeRequest>,
        ) -> Result<tonic::Response<MapVolumeReply>, Status> {
            let volume_id = request.into_inner().volume_id;
            assert_eq!(volume_id, "vol-1");
            Ok(tonic::Response::new(MapVolumeReply {
                pci_address: ":1f:.0".to_string(),
                scsi_disk: Some(ScsiDisk { target: 2, lun: 0 }),
            }))
        }

        async fn unmap_volume(
            &self,
            _request: tonic::Request<UnmapVolumeRequest>,
        ) -> Result<tonic::Response<UnmapVolumeReply>, Status> {
            Ok(tonic::Response::new(UnmapVolumeReply {}))
        }

        async fn provision_malloc_bdev(
            &self,
            _request: tonic::Request<ProvisionMallocBdevRequest>,
        ) -> Result<tonic::Response<ProvisionMallocBdevReply>, Status> {
            Err(Status::out_of_range("too big"))
        }

        async fn check_malloc_bdev(
            &self,
            _request: tonic::Request<CheckMallocBdevRequest>,
        ) -> Result<tonic::Response<CheckMallocBdevReply>, Status> {
            Ok(tonic::Response::new(CheckMallocBdevReply {}))
        }
    }

    async fn serve_controller(path: &Path) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(
            Server::builder()
                .add_service(ControllerServer::new(FakeController))
                .serve_with_incoming(UnixListenerStream::new(listener)),
        );
    }

    async fn serve_registry(path: &Path, store: Store) {
        let listener = UnixListener::bind(path).unwrap();
        let layer = ProxyLayer::new(store.clone(), Dialer::default());
        tokio::spawn(
            Server::builder()
                .layer(layer)
                .add_service(RegistryServer::new(RegistryService::new(store)))
                .serve_with_incoming(UnixListenerStream::new(listener)),
        );
    }

    async fn dial(path: &Path) -> Channel {
        let endpoint = format!("unix://{}", path.display());
        let dialer = Dialer::default();
        for _ in 0..50 {
            if let Ok(channel) = dialer.dial(&endpoint).await {
                return channel;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("registry never came up");
    }

    fn with_controller_id<T>(message: T, id: &str) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(CONTROLLER_ID_KEY, id.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn forwards_controller_calls_by_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let controller_sock = dir.path().join("controller.sock");
        let registry_sock = dir.path().join("registry.sock");

        serve_controller(&controller_sock).await;
        let store = Store::new();
        store
            .set(
                "foo/address",
                &format!("unix://{}", controller_sock.display()),
            )
            .unwrap();
        serve_registry(&registry_sock, store).await;

        let channel = dial(&registry_sock).await;
        let mut client = ControllerClient::new(channel);

        let reply = client
            .map_volume(with_controller_id(
                MapVolumeRequest {
                    volume_id: "vol-1".to_string(),
                    params: None,
                },
                "foo",
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(reply.pci_address, ":1f:.0");
        assert_eq!(reply.scsi_disk, Some(ScsiDisk { target: 2, lun: 0 }));

        // downstream errors come back unchanged
        let err = client
            .provision_malloc_bdev(with_controller_id(
                ProvisionMallocBdevRequest {
                    bdev_name: "x".to_string(),
                    size: 1,
                },
                "foo",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::OutOfRange);
        assert_eq!(err.message(), "too big");
    }

    #[tokio::test]
    async fn unknown_controller_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let registry_sock = dir.path().join("registry.sock");
        serve_registry(&registry_sock, Store::new()).await;

        let channel = dial(&registry_sock).await;
        let mut client = ControllerClient::new(channel);

        let err = client
            .unmap_volume(with_controller_id(
                UnmapVolumeRequest {
                    volume_id: "vol-1".to_string(),
                },
                "bar",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
        assert!(err.message().contains("bar"));

        let err = client
            .unmap_volume(tonic::Request::new(UnmapVolumeRequest {
                volume_id: "vol-1".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn registry_namespace_is_never_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let registry_sock = dir.path().join("registry.sock");
        let store = Store::new();
        serve_registry(&registry_sock, store).await;

        let channel = dial(&registry_sock).await;
        let mut client = RegistryClient::new(channel);

        // controllerid metadata present, yet the call is served locally
        client
            .set_value(with_controller_id(
                SetValueRequest {
                    value: Some(Value {
                        path: "foo/pci".to_string(),
                        value: "0000:00:1f.0".to_string(),
                    }),
                },
                "foo",
            ))
            .await
            .unwrap();
        let values = client
            .get_values(with_controller_id(
                GetValuesRequest {
                    path: "foo".to_string(),
                },
                "foo",
            ))
            .await
            .unwrap()
            .into_inner()
            .values;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].path, "foo/pci");
    }
}
