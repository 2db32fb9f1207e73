//! The oxbow registry daemon: config store plus controller proxy.

use clap::Parser;
use common::{
    endpoint::{parse_endpoint, Dialer},
    tls::{self, TlsFiles},
};
use registry::{proxy::ProxyLayer, service::RegistryService, store::Store};
use rpc::v0::registry_server::RegistryServer;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "oxbow-registry")]
/// Central registry: stores controller records and proxies controller RPCs.
struct Opts {
    /// Endpoint to listen on (unix://<path> or tcp://<host:port>).
    #[arg(long, default_value = "tcp://0.0.0.0:8999")]
    endpoint: String,

    /// CA certificate bundle; enables mutual TLS together with --key.
    #[arg(long, requires = "key")]
    ca: Option<std::path::PathBuf>,

    /// Private key file; the certificate is expected next to it as
    /// <base>.crt.
    #[arg(long, requires = "ca")]
    key: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::init_logging();
    let opts = Opts::parse();

    let tls_files = match (&opts.ca, &opts.key) {
        (Some(ca), Some(key)) => Some(TlsFiles::new(ca, key)),
        _ => None,
    };

    let store = Store::new();
    let proxy = ProxyLayer::new(store.clone(), Dialer::new(tls_files.clone()));
    let service = RegistryServer::new(RegistryService::new(store));

    let mut builder = Server::builder();
    if let Some(files) = &tls_files {
        builder = builder.tls_config(tls::server_config(files).await?)?;
    }
    let router = builder.layer(proxy).add_service(service);

    let (scheme, rest) = parse_endpoint(&opts.endpoint)?;
    info!(endpoint = %opts.endpoint, "registry listening");
    if scheme.eq_ignore_ascii_case("unix") {
        // a previous run may have left the socket behind
        let _ = std::fs::remove_file(rest);
        let listener = UnixListener::bind(rest)?;
        router
            .serve_with_incoming(UnixListenerStream::new(listener))
            .await?;
    } else {
        router.serve(rest.parse()?).await?;
    }
    Ok(())
}
