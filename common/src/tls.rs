//! Mutual-TLS credential handling. Credentials come as a key file with a
//! sibling certificate (`<base>.key` + `<base>.crt`) plus a CA bundle that
//! doubles as root and client CA. Files are read right before use; see
//! [`Dialer`](crate::endpoint::Dialer) for why.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Locations of the credential files used for one peer.
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub ca: PathBuf,
    pub key: PathBuf,
}

impl TlsFiles {
    pub fn new(ca: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            ca: ca.into(),
            key: key.into(),
        }
    }

    /// The certificate lives next to the key as `<base>.crt`.
    fn cert(&self) -> PathBuf {
        self.key.with_extension("crt")
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, Error> {
    tokio::fs::read(path).await.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

async fn identity(files: &TlsFiles) -> Result<Identity, Error> {
    let cert = read(&files.cert()).await?;
    let key = read(&files.key).await?;
    Ok(Identity::from_pem(cert, key))
}

/// Client-side config: present our identity, trust the CA, expect the
/// server to be `domain`.
pub async fn client_config(
    files: &TlsFiles,
    domain: &str,
) -> Result<ClientTlsConfig, Error> {
    let ca = read(&files.ca).await?;
    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(identity(files).await?)
        .domain_name(domain))
}

/// Server-side config: present our identity and require client certificates
/// signed by the CA (mutual TLS).
pub async fn server_config(files: &TlsFiles) -> Result<ServerTlsConfig, Error> {
    let ca = read(&files.ca).await?;
    Ok(ServerTlsConfig::new()
        .identity(identity(files).await?)
        .client_ca_root(Certificate::from_pem(ca)))
}
