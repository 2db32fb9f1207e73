//! Protobuf message types and gRPC plumbing for the oxbow control plane and
//! the CSI v1 surface the driver implements.
//!
//! The message structs are hand-maintained prost derives and the
//! client/server modules follow the tonic codegen layout, so building this
//! crate needs no protoc binary. Methods a service does not route fall
//! through to a grpc-status 12 (UNIMPLEMENTED) response, which is also the
//! contract for the CSI methods the driver leaves unimplemented.

pub mod csi;
pub mod v0;

use std::{future::Future, pin::Pin};

pub(crate) type BoxFuture<T, E> =
    Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

pub(crate) fn unimplemented_response() -> http::Response<tonic::body::BoxBody> {
    http::Response::builder()
        .status(200)
        .header("grpc-status", "12")
        .header("content-type", "application/grpc")
        .body(tonic::body::empty_body())
        .unwrap()
}

/// One match arm of a hand-maintained service router: adapt trait method
/// `$method` into a `UnaryService` and hand the request to tonic's codec
/// machinery.
macro_rules! unary {
    ($trait_:ident, $inner:expr, $req:expr, $reqty:ty, $respty:ty, $method:ident) => {{
        struct Svc<T>(std::sync::Arc<T>);
        impl<T: $trait_> tonic::server::UnaryService<$reqty> for Svc<T> {
            type Response = $respty;
            type Future =
                crate::BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
            fn call(
                &mut self,
                request: tonic::Request<$reqty>,
            ) -> Self::Future {
                let inner = std::sync::Arc::clone(&self.0);
                Box::pin(async move { inner.$method(request).await })
            }
        }
        let inner = $inner;
        let req = $req;
        Box::pin(async move {
            let mut grpc =
                tonic::server::Grpc::new(tonic::codec::ProstCodec::default());
            Ok(grpc.unary(Svc(inner), req).await)
        })
    }};
}

pub(crate) use unary;
