//! Direct back-end: the SPDK daemon runs on this host and volumes are
//! exposed through kernel nbd devices. Every operation opens a fresh
//! json-rpc connection and closes it when done.

use std::{path::PathBuf, time::Duration};

use common::capacity::{round_volume_size, BLOCK_SIZE};
use jsonrpc::{spdk::NbdDisk, Client};
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Device, DeviceRequest},
    nbd,
};

const NBD_READY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SpdkBackend {
    socket: String,
    dev_dir: PathBuf,
}

impl SpdkBackend {
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
            dev_dir: PathBuf::from("/dev"),
        }
    }

    /// Probe a different directory for nbd nodes. Test hook.
    pub fn with_dev_dir(mut self, dev_dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dev_dir.into();
        self
    }

    async fn connect(&self) -> Result<Client, BackendError> {
        Ok(Client::connect(&self.socket).await?)
    }
}

/// The nbd export of a volume, when one exists.
async fn lookup_nbd(
    client: &Client,
    volume_id: &str,
) -> Result<Option<NbdDisk>, BackendError> {
    let disks = client.get_nbd_disks().await?;
    Ok(disks.into_iter().find(|disk| disk.bdev_name == volume_id))
}

#[tonic::async_trait]
impl Backend for SpdkBackend {
    async fn create_volume(
        &self,
        volume_id: &str,
        required_bytes: i64,
    ) -> Result<i64, BackendError> {
        let size = round_volume_size(required_bytes)?;
        let client = self.connect().await?;
        match client.get_bdevs(Some(volume_id)).await {
            Ok(bdevs) if !bdevs.is_empty() => {
                let existing = bdevs[0].size_bytes();
                if existing >= size {
                    return Ok(existing);
                }
                return Err(BackendError::AlreadyExists(format!(
                    "Volume {} exists with {} bytes, {} requested",
                    volume_id, existing, size
                )));
            }
            Ok(_) => {}
            // the daemon's way of saying "no such bdev"
            Err(err) if err.is_invalid_params() => {}
            Err(err) => return Err(err.into()),
        }
        client
            .construct_malloc_bdev(
                (size / BLOCK_SIZE) as u64,
                BLOCK_SIZE as u32,
                Some(volume_id),
                None,
            )
            .await?;
        info!(volume = volume_id, size, "volume created");
        Ok(size)
    }

    async fn delete_volume(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        let client = self.connect().await?;
        match client.delete_bdev(volume_id).await {
            Ok(()) => {
                info!(volume = volume_id, "volume deleted");
                Ok(())
            }
            // absent already: deletion is idempotent
            Err(err) if err.is_invalid_params() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn check_volume_exists(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        let client = self.connect().await?;
        match client.get_bdevs(Some(volume_id)).await {
            Ok(bdevs) if !bdevs.is_empty() => Ok(()),
            Ok(_) => {
                Err(BackendError::NotFound(format!("No volume {}", volume_id)))
            }
            Err(err) if err.is_invalid_params() => {
                Err(BackendError::NotFound(format!("No volume {}", volume_id)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Device, BackendError> {
        let volume_id = request.volume_id.as_str();
        let client = self.connect().await?;

        // publish is idempotent, the volume may already be exported
        if let Some(disk) = lookup_nbd(&client, volume_id).await? {
            return Ok(Device {
                path: PathBuf::from(disk.nbd_device),
                cleanup: None,
            });
        }
        self.check_volume_exists(volume_id).await?;

        let node = nbd::find_unused(&self.dev_dir)
            .map_err(|err| {
                BackendError::Internal(format!("Probing nbd devices: {}", err))
            })?
            .ok_or_else(|| {
                BackendError::Internal(
                    "No unused nbd device found".to_string(),
                )
            })?;
        let node_str = node.to_string_lossy().to_string();
        client.start_nbd_disk(volume_id, &node_str).await?;

        if let Err(err) = nbd::wait_until_ready(&node, NBD_READY_TIMEOUT).await
        {
            // roll the export back, the device never became usable
            let _ = client.stop_nbd_disk(&node_str).await;
            return Err(err);
        }
        info!(volume = volume_id, device = %node.display(), "volume exported");
        Ok(Device {
            path: node,
            cleanup: None,
        })
    }

    async fn delete_device(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError> {
        let client = self.connect().await?;
        match lookup_nbd(&client, volume_id).await? {
            Some(disk) => {
                client.stop_nbd_disk(&disk.nbd_device).await?;
                info!(volume = volume_id, device = %disk.nbd_device,
                      "export stopped");
                Ok(())
            }
            // already unmapped
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::capacity::MIN_VOLUME_SIZE;
    use serde_json::{json, Value};
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::UnixListener,
    };

    /// Scripted daemon: just enough of the malloc bdev surface for the
    /// volume operations.
    #[derive(Default, Clone)]
    struct FakeSpdk {
        bdevs: Arc<Mutex<HashMap<String, i64>>>,
    }

    impl FakeSpdk {
        fn handle(&self, method: &str, params: &Value) -> Result<Value, i32> {
            let mut bdevs = self.bdevs.lock().unwrap();
            match method {
                "get_bdevs" => match params.get("name") {
                    Some(name) => {
                        let name = name.as_str().unwrap();
                        let size =
                            bdevs.get(name).copied().ok_or(-32602_i32)?;
                        Ok(json!([{
                            "name": name,
                            "num_blocks": size / 512,
                            "block_size": 512,
                        }]))
                    }
                    None => Ok(json!(bdevs
                        .iter()
                        .map(|(name, size)| json!({
                            "name": name,
                            "num_blocks": size / 512,
                            "block_size": 512,
                        }))
                        .collect::<Vec<_>>())),
                },
                "construct_malloc_bdev" => {
                    let name =
                        params["name"].as_str().unwrap().to_string();
                    let size = params["num_blocks"].as_i64().unwrap()
                        * params["block_size"].as_i64().unwrap();
                    bdevs.insert(name.clone(), size);
                    Ok(json!([name]))
                }
                "delete_bdev" => {
                    let name = params["name"].as_str().unwrap();
                    bdevs.remove(name).ok_or(-32602_i32)?;
                    Ok(json!(true))
                }
                "get_nbd_disks" => Ok(json!([])),
                _ => Err(-32601),
            }
        }

        fn serve(&self, listener: UnixListener) {
            let fake = self.clone();
            tokio::spawn(async move {
                while let Ok((sock, _)) = listener.accept().await {
                    let fake = fake.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = sock.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            let req: Value =
                                serde_json::from_str(&line).unwrap();
                            let id = req["id"].clone();
                            let empty = json!({});
                            let params =
                                req.get("params").unwrap_or(&empty);
                            let reply = match fake
                                .handle(req["method"].as_str().unwrap(), params)
                            {
                                Ok(result) => json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "result": result,
                                }),
                                Err(code) => json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "error": {
                                        "code": code,
                                        "message": "fake error",
                                    },
                                }),
                            };
                            let mut line =
                                serde_json::to_vec(&reply).unwrap();
                            line.push(b'\n');
                            if write.write_all(&line).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            });
        }
    }

    fn start_backend() -> (SpdkBackend, FakeSpdk, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("spdk.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let fake = FakeSpdk::default();
        fake.serve(listener);
        let backend = SpdkBackend::new(socket.to_string_lossy().to_string());
        (backend, fake, dir)
    }

    #[tokio::test]
    async fn create_rounds_up() {
        let (backend, _fake, _dir) = start_backend();
        assert_eq!(
            backend.create_volume("tiny", 1).await.unwrap(),
            MIN_VOLUME_SIZE
        );
        assert_eq!(backend.create_volume("odd", 513).await.unwrap(), 1024);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (backend, _fake, _dir) = start_backend();
        let first = backend.create_volume("vol", 4 << 20).await.unwrap();
        let second = backend.create_volume("vol", 4 << 20).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn create_rejects_shrink_and_grow() {
        let (backend, _fake, _dir) = start_backend();
        backend.create_volume("vol", 4 << 20).await.unwrap();
        // a smaller request is satisfied by the existing volume
        assert_eq!(
            backend.create_volume("vol", 2 << 20).await.unwrap(),
            4 << 20
        );
        let err = backend.create_volume("vol", 8 << 20).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn create_rejects_one_tib() {
        let (backend, _fake, _dir) = start_backend();
        let err = backend.create_volume("big", 1 << 40).await.unwrap_err();
        assert!(matches!(err, BackendError::OutOfRange(_)));
    }

    #[tokio::test]
    async fn delete_of_absent_volume_succeeds() {
        let (backend, _fake, _dir) = start_backend();
        backend.delete_volume("never-created").await.unwrap();

        backend.create_volume("vol", 1 << 20).await.unwrap();
        backend.delete_volume("vol").await.unwrap();
        backend.delete_volume("vol").await.unwrap();
    }

    #[tokio::test]
    async fn check_reports_not_found() {
        let (backend, _fake, _dir) = start_backend();
        let err = backend.check_volume_exists("vol").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));

        backend.create_volume("vol", 1 << 20).await.unwrap();
        backend.check_volume_exists("vol").await.unwrap();
    }
}
