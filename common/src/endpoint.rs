//! Endpoint strings and scoped grpc dialing.
//!
//! Endpoints are written `unix://<path>` or `tcp://<host:port>`. The unix
//! scheme needs a custom connector because the stock grpc resolver does not
//! understand unix sockets.

use std::time::Duration;

use thiserror::Error;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::tls::{self, TlsFiles};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid endpoint {0:?}: expected unix://<path> or tcp://<host:port>")]
    InvalidEndpoint(String),
    #[error("Failed to load TLS credentials: {0}")]
    Credentials(#[from] tls::Error),
    #[error("Connection failed: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Split an endpoint into its scheme (as written) and the rest. Only the
/// unix and tcp schemes are accepted, case-insensitively, and the rest must
/// be non-empty.
pub fn parse_endpoint(endpoint: &str) -> Result<(&str, &str), Error> {
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| Error::InvalidEndpoint(endpoint.to_string()))?;
    if !scheme.eq_ignore_ascii_case("unix") && !scheme.eq_ignore_ascii_case("tcp")
    {
        return Err(Error::InvalidEndpoint(endpoint.to_string()));
    }
    if rest.is_empty() {
        return Err(Error::InvalidEndpoint(endpoint.to_string()));
    }
    Ok((scheme, rest))
}

/// True when the endpoint names a unix domain socket.
pub fn is_unix(endpoint: &str) -> Result<bool, Error> {
    let (scheme, _) = parse_endpoint(endpoint)?;
    Ok(scheme.eq_ignore_ascii_case("unix"))
}

/// Dials endpoints on demand. TLS credentials, when configured, are read
/// from disk again on every dial so certificate rotation takes effect
/// without a restart.
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    tls: Option<TlsFiles>,
}

impl Dialer {
    pub fn new(tls: Option<TlsFiles>) -> Self {
        Self { tls }
    }

    pub async fn dial(&self, endpoint: &str) -> Result<Channel, Error> {
        let (scheme, rest) = parse_endpoint(endpoint)?;
        if scheme.eq_ignore_ascii_case("unix") {
            let path = rest.to_string();
            // the authority below is never resolved, the connector is
            let channel = Endpoint::try_from("http://[::]:50051")?
                .connect_timeout(Duration::from_secs(10))
                .connect_with_connector(service_fn(move |_: Uri| {
                    UnixStream::connect(path.clone())
                }))
                .await?;
            return Ok(channel);
        }

        let mut endpoint = Endpoint::try_from(format!("http://{}", rest))?
            .connect_timeout(Duration::from_secs(10));
        if let Some(files) = &self.tls {
            let host = rest.rsplit_once(':').map(|(host, _)| host).unwrap_or(rest);
            endpoint = endpoint.tls_config(tls::client_config(files, host).await?)?;
        }
        Ok(endpoint.connect().await?)
    }
}
