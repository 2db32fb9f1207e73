//! The oxbow controller daemon.

use clap::Parser;
use common::{
    endpoint::{parse_endpoint, Dialer},
    tls::{self, TlsFiles},
};
use controller::service::ControllerService;
use rpc::v0::{
    controller_server::ControllerServer, registry_client::RegistryClient,
    SetValueRequest, Value, ADDRESS_LEAF, PCI_LEAF,
};
use sysfs::pci::PciAddress;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "oxbow-controller")]
/// Per-machine controller driving the local SPDK daemon.
struct Opts {
    /// Endpoint to listen on.
    #[arg(long, default_value = "tcp://0.0.0.0:8998")]
    endpoint: String,

    /// Endpoint to publish in the registry; defaults to the listen
    /// endpoint.
    #[arg(long)]
    advertise: Option<String>,

    /// SPDK json-rpc socket.
    #[arg(long, default_value = "/var/tmp/spdk.sock")]
    spdk: String,

    /// Controller id under which this instance registers.
    #[arg(long = "controller-id")]
    controller_id: Option<String>,

    /// Registry endpoint; skips registration when absent.
    #[arg(long)]
    registry: Option<String>,

    /// Name of the vhost-scsi device volumes are attached to.
    #[arg(long, default_value = "oxbow.0")]
    vhost: String,

    /// PCI address of the vhost device as seen by the guest, may be
    /// partial (e.g. ":1f:.0").
    #[arg(long)]
    pci: Option<String>,

    /// CA certificate bundle; enables mutual TLS together with --key.
    #[arg(long, requires = "key")]
    ca: Option<std::path::PathBuf>,

    /// Private key file with its certificate next to it as <base>.crt.
    #[arg(long, requires = "ca")]
    key: Option<std::path::PathBuf>,
}

struct Registration {
    dialer: Dialer,
    registry: String,
    controller_id: String,
    advertise: String,
    pci: Option<String>,
}

impl Registration {
    async fn set(&self, leaf: &str, value: &str) -> Result<(), tonic::Status> {
        let channel = self
            .dialer
            .dial(&self.registry)
            .await
            .map_err(|err| tonic::Status::unavailable(err.to_string()))?;
        RegistryClient::new(channel)
            .set_value(SetValueRequest {
                value: Some(Value {
                    path: format!("{}/{}", self.controller_id, leaf),
                    value: value.to_string(),
                }),
            })
            .await?;
        Ok(())
    }

    async fn register(&self) -> Result<(), tonic::Status> {
        self.set(ADDRESS_LEAF, &self.advertise).await?;
        if let Some(pci) = &self.pci {
            self.set(PCI_LEAF, pci).await?;
        }
        info!(id = %self.controller_id, address = %self.advertise, "registered");
        Ok(())
    }

    async fn deregister(&self) {
        for leaf in [ADDRESS_LEAF, PCI_LEAF] {
            if let Err(err) = self.set(leaf, "").await {
                warn!("Failed to remove {} record: {}", leaf, err);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::init_logging();
    let opts = Opts::parse();

    if let Some(pci) = &opts.pci {
        // fail early on a flag typo; partial addresses are fine
        pci.parse::<PciAddress>()?;
    }

    let tls_files = match (&opts.ca, &opts.key) {
        (Some(ca), Some(key)) => Some(TlsFiles::new(ca, key)),
        _ => None,
    };

    let registration = match (&opts.registry, &opts.controller_id) {
        (Some(registry), Some(controller_id)) => Some(Registration {
            dialer: Dialer::new(tls_files.clone()),
            registry: registry.clone(),
            controller_id: controller_id.clone(),
            advertise: opts
                .advertise
                .clone()
                .unwrap_or_else(|| opts.endpoint.clone()),
            pci: opts.pci.clone(),
        }),
        (Some(_), None) => {
            return Err("--registry needs --controller-id".into())
        }
        _ => None,
    };

    let service = ControllerServer::new(ControllerService::new(
        opts.spdk.clone(),
        opts.vhost.clone(),
        opts.pci.clone().unwrap_or_default(),
    ));

    let mut builder = Server::builder();
    if let Some(files) = &tls_files {
        builder = builder.tls_config(tls::server_config(files).await?)?;
    }
    let router = builder.add_service(service);

    if let Some(registration) = &registration {
        registration.register().await?;
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    };

    let (scheme, rest) = parse_endpoint(&opts.endpoint)?;
    info!(endpoint = %opts.endpoint, "controller listening");
    let served = if scheme.eq_ignore_ascii_case("unix") {
        let _ = std::fs::remove_file(rest);
        let listener = UnixListener::bind(rest)?;
        router
            .serve_with_incoming_shutdown(
                UnixListenerStream::new(listener),
                shutdown,
            )
            .await
    } else {
        router.serve_with_shutdown(rest.parse()?, shutdown).await
    };

    if let Some(registration) = &registration {
        registration.deregister().await;
    }
    served?;
    Ok(())
}
