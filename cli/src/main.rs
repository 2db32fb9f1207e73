//! Thin admin tool for the registry: read or write entries.

use clap::Parser;
use common::{endpoint::Dialer, tls::TlsFiles};
use rpc::v0::{
    registry_client::RegistryClient, GetValuesRequest, SetValueRequest, Value,
};

#[derive(Parser, Debug)]
#[command(name = "oxctl")]
/// Inspect and edit the oxbow registry.
struct Opts {
    /// Registry endpoint.
    #[arg(long, default_value = "tcp://127.0.0.1:8999")]
    registry: String,

    /// Print entries under --path (all entries when --path is omitted).
    #[arg(long, conflicts_with = "set")]
    get: bool,

    /// Set --path to --value; an empty value deletes the entry.
    #[arg(long, requires = "path")]
    set: bool,

    #[arg(long)]
    path: Option<String>,

    #[arg(long, default_value = "")]
    value: String,

    /// CA certificate bundle for a TLS registry endpoint.
    #[arg(long, requires = "key")]
    ca: Option<std::path::PathBuf>,

    /// Private key file with its certificate next to it as <base>.crt.
    #[arg(long, requires = "ca")]
    key: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    let tls_files = match (&opts.ca, &opts.key) {
        (Some(ca), Some(key)) => Some(TlsFiles::new(ca, key)),
        _ => None,
    };
    let channel = Dialer::new(tls_files).dial(&opts.registry).await?;
    let mut client = RegistryClient::new(channel);

    if opts.set {
        let path = opts.path.clone().unwrap_or_default();
        client
            .set_value(SetValueRequest {
                value: Some(Value {
                    path,
                    value: opts.value.clone(),
                }),
            })
            .await?;
    } else if opts.get {
        let mut values = client
            .get_values(GetValuesRequest {
                path: opts.path.clone().unwrap_or_default(),
            })
            .await?
            .into_inner()
            .values;
        values.sort_by(|a, b| a.path.cmp(&b.path));
        for value in values {
            println!("{}={}", value.path, value.value);
        }
    } else {
        return Err("Pass one of --get or --set".into());
    }
    Ok(())
}
