//! The oxbow CSI plugin daemon.

use std::sync::Arc;

use clap::Parser;
use common::{endpoint::parse_endpoint, endpoint::Dialer, tls::TlsFiles};
use csi::{
    backend::Backend, controller::Controller, emulate, identity::Identity,
    node::Node, remote::RemoteBackend, spdk::SpdkBackend, vlock::VolumeLocks,
};
use rpc::csi::{
    controller_server::ControllerServer, identity_server::IdentityServer,
    node_server::NodeServer,
};
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "oxbow-csi")]
/// CSI plugin exposing oxbow volumes to the orchestrator.
struct Opts {
    /// Endpoint the orchestrator talks to, normally a unix socket.
    #[arg(long = "csi-endpoint", default_value = "unix:///var/tmp/oxbow-csi.sock")]
    csi_endpoint: String,

    /// Name this node reports to the orchestrator.
    #[arg(long = "node-id")]
    node_id: String,

    /// SPDK json-rpc socket; selects the direct nbd back-end.
    #[arg(long, conflicts_with = "registry")]
    spdk: Option<String>,

    /// Registry endpoint; selects the remote back-end together with
    /// --controller-id.
    #[arg(long, requires = "controller_id")]
    registry: Option<String>,

    /// Controller serving this node's volumes on the remote path.
    #[arg(long = "controller-id")]
    controller_id: Option<String>,

    /// Emulated driver personality.
    #[arg(long, default_value = emulate::DEFAULT_DRIVER)]
    emulate: String,

    /// CA certificate bundle for the registry connection.
    #[arg(long, requires = "key")]
    ca: Option<std::path::PathBuf>,

    /// Private key file with its certificate next to it as <base>.crt.
    #[arg(long, requires = "ca")]
    key: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::init_logging();
    let opts = Opts::parse();

    let driver = emulate::lookup(&opts.emulate).ok_or_else(|| {
        format!("Unknown emulated driver {:?}", opts.emulate)
    })?;

    let backend: Arc<dyn Backend> =
        match (&opts.spdk, &opts.registry, &opts.controller_id) {
            (Some(spdk), None, _) => Arc::new(SpdkBackend::new(spdk.clone())),
            (None, Some(registry), Some(controller_id)) => {
                let tls_files = match (&opts.ca, &opts.key) {
                    (Some(ca), Some(key)) => Some(TlsFiles::new(ca, key)),
                    _ => None,
                };
                Arc::new(
                    RemoteBackend::new(
                        registry.clone(),
                        controller_id.clone(),
                        Dialer::new(tls_files),
                        driver,
                    )
                    .map_err(|err| err.into_status().to_string())?,
                )
            }
            _ => return Err("Pass either --spdk or --registry".into()),
        };

    let locks = Arc::new(VolumeLocks::new());
    let identity = IdentityServer::new(Identity);
    let controller = ControllerServer::new(Controller::new(
        Arc::clone(&backend),
        Arc::clone(&locks),
        driver,
    ));
    let node = NodeServer::new(Node::new(
        opts.node_id.clone(),
        Arc::clone(&backend),
        Arc::clone(&locks),
    ));

    let router = Server::builder()
        .add_service(identity)
        .add_service(controller)
        .add_service(node);

    let (scheme, rest) = parse_endpoint(&opts.csi_endpoint)?;
    info!(endpoint = %opts.csi_endpoint, node = %opts.node_id,
          emulate = %opts.emulate, "CSI plugin listening");
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
