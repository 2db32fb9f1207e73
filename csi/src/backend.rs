//! The five-operation contract both storage back-ends implement. The two
//! implementations must be indistinguishable to the caller except for
//! latency; failure semantics are pinned down here and mapped onto grpc
//! status codes in one place.

use std::{collections::HashMap, path::PathBuf};

use common::capacity::CapacityError;
use thiserror::Error;
use tonic::Status;

/// Removes scratch state left behind by `create_device` (the materialised
/// device node and its temporary directory). Runs on every exit path of the
/// caller, success included; failures inside are logged, never returned.
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// A usable block device node for a published volume.
pub struct Device {
    pub path: PathBuf,
    pub cleanup: Option<Cleanup>,
}

/// The slice of a CSI publish/stage request a back-end needs to map a
/// volume.
#[derive(Debug, Clone, Default)]
pub struct DeviceRequest {
    pub volume_id: String,
    pub staging_path: String,
    pub parameters: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
    pub volume_context: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Timed out waiting for the device to appear")]
    DeadlineExceeded,
    #[error("{0}")]
    Internal(String),
}

impl BackendError {
    pub fn into_status(self) -> Status {
        let message = self.to_string();
        match self {
            BackendError::InvalidArgument(_) => {
                Status::invalid_argument(message)
            }
            BackendError::NotFound(_) => Status::not_found(message),
            BackendError::AlreadyExists(_) => Status::already_exists(message),
            BackendError::OutOfRange(_) => Status::out_of_range(message),
            BackendError::FailedPrecondition(_) => {
                Status::failed_precondition(message)
            }
            BackendError::Unavailable(_) => Status::unavailable(message),
            BackendError::DeadlineExceeded => {
                Status::deadline_exceeded(message)
            }
            BackendError::Internal(_) => Status::internal(message),
        }
    }
}

impl From<CapacityError> for BackendError {
    fn from(err: CapacityError) -> Self {
        BackendError::OutOfRange(err.to_string())
    }
}

impl From<jsonrpc::error::Error> for BackendError {
    fn from(err: jsonrpc::error::Error) -> Self {
        use jsonrpc::error::{Error, RpcCode};
        match &err {
            // daemon not reachable: the back-end is missing, not broken
            Error::ConnectError { .. } => {
                BackendError::FailedPrecondition(err.to_string())
            }
            Error::RpcError { code, msg } => match code {
                RpcCode::NotFound => BackendError::NotFound(msg.clone()),
                RpcCode::AlreadyExists => {
                    BackendError::AlreadyExists(msg.clone())
                }
                _ => BackendError::Internal(err.to_string()),
            },
            _ => BackendError::Internal(err.to_string()),
        }
    }
}

impl From<Status> for BackendError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            tonic::Code::InvalidArgument => {
                BackendError::InvalidArgument(message)
            }
            tonic::Code::NotFound => BackendError::NotFound(message),
            tonic::Code::AlreadyExists => BackendError::AlreadyExists(message),
            tonic::Code::OutOfRange => BackendError::OutOfRange(message),
            tonic::Code::FailedPrecondition => {
                BackendError::FailedPrecondition(message)
            }
            tonic::Code::Unavailable => BackendError::Unavailable(message),
            tonic::Code::DeadlineExceeded => BackendError::DeadlineExceeded,
            _ => BackendError::Internal(message),
        }
    }
}

impl From<common::endpoint::Error> for BackendError {
    fn from(err: common::endpoint::Error) -> Self {
        // registry or controller unreachable
        BackendError::FailedPrecondition(err.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use common::capacity::round_volume_size;
    use std::sync::Mutex;

    /// In-memory back-end with the contract's volume semantics, for
    /// exercising the services without a daemon.
    #[derive(Default)]
    pub struct MockBackend {
        pub volumes: Mutex<HashMap<String, i64>>,
    }

    #[tonic::async_trait]
    impl Backend for MockBackend {
        async fn create_volume(
            &self,
            volume_id: &str,
            required_bytes: i64,
        ) -> Result<i64, BackendError> {
            let size = round_volume_size(required_bytes)?;
            let mut volumes = self.volumes.lock().unwrap();
            if let Some(&existing) = volumes.get(volume_id) {
                if existing >= size {
                    return Ok(existing);
                }
                return Err(BackendError::AlreadyExists(format!(
                    "Volume {} exists with {} bytes, {} requested",
                    volume_id, existing, size
                )));
            }
            volumes.insert(volume_id.to_string(), size);
            Ok(size)
        }

        async fn delete_volume(
            &self,
            volume_id: &str,
        ) -> Result<(), BackendError> {
            self.volumes.lock().unwrap().remove(volume_id);
            Ok(())
        }

        async fn check_volume_exists(
            &self,
            volume_id: &str,
        ) -> Result<(), BackendError> {
            if self.volumes.lock().unwrap().contains_key(volume_id) {
                Ok(())
            } else {
                Err(BackendError::NotFound(format!(
                    "No volume {}",
                    volume_id
                )))
            }
        }

        async fn create_device(
            &self,
            _request: &DeviceRequest,
        ) -> Result<Device, BackendError> {
            Err(BackendError::Internal(
                "mock backend has no devices".to_string(),
            ))
        }

        async fn delete_device(
            &self,
            _volume_id: &str,
        ) -> Result<(), BackendError> {
            Ok(())
        }
    }
}

/// Storage back-end contract.
///
/// `create_volume` reports the allocated size after rounding; recreating an
/// existing volume succeeds iff its size covers the request and fails with
/// AlreadyExists otherwise. `delete_volume` and `delete_device` treat
/// absence as success.
#[tonic::async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn create_volume(
        &self,
        volume_id: &str,
        required_bytes: i64,
    ) -> Result<i64, BackendError>;

    async fn delete_volume(&self, volume_id: &str)
        -> Result<(), BackendError>;

    async fn check_volume_exists(
        &self,
        volume_id: &str,
    ) -> Result<(), BackendError>;

    async fn create_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Device, BackendError>;

    async fn delete_device(&self, volume_id: &str)
        -> Result<(), BackendError>;
}
