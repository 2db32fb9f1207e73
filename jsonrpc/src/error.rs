//! Error types of the json-rpc client. The daemon reports most conditions
//! through the standard json-rpc error codes and sometimes through negated
//! errno values, both of which collapse into [`RpcCode`].

use thiserror::Error;
use tonic::Status;

/// json-rpc error code for invalid method parameters. The daemon answers
/// with this code when asked about objects it does not know, so on lookup
/// style methods it doubles as "not found".
pub const ERROR_INVALID_PARAMS: i32 = -32602;

// errno values the daemon negates into error codes
const ENOENT: i32 = 2;
const EEXIST: i32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    NotFound,
    AlreadyExists,
}

impl RpcCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            -32700 => RpcCode::ParseError,
            -32600 => RpcCode::InvalidRequest,
            -32601 => RpcCode::MethodNotFound,
            ERROR_INVALID_PARAMS => RpcCode::InvalidParams,
            -32603 => RpcCode::InternalError,
            val => {
                if val == -ENOENT {
                    RpcCode::NotFound
                } else if val == -EEXIST {
                    RpcCode::AlreadyExists
                } else {
                    tracing::error!("Unknown json-rpc error code {}", val);
                    RpcCode::InternalError
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to connect to {sock}: {source}")]
    ConnectError {
        sock: String,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid json-rpc version in reply")]
    InvalidVersion,
    #[error("Invalid or missing reply id")]
    InvalidReplyId,
    #[error("Connection to the daemon was lost")]
    ConnectionLost,
    #[error("Failed to parse json: {0}")]
    ParseError(serde_json::Error),
    #[error("Json-rpc error {code:?}: {msg}")]
    RpcError { code: RpcCode, msg: String },
}

impl Error {
    /// The daemon reported invalid parameters. On lookup methods this is
    /// its way of saying the object does not exist.
    pub fn is_invalid_params(&self) -> bool {
        matches!(
            self,
            Error::RpcError {
                code: RpcCode::InvalidParams,
                ..
            }
        )
    }

    /// Convert to a grpc status for returning from service handlers.
    pub fn into_status(self) -> Status {
        match self {
            Error::ConnectError { .. } => {
                Status::failed_precondition(self.to_string())
            }
            Error::RpcError {
                code: RpcCode::NotFound,
                ref msg,
            } => Status::not_found(msg.clone()),
            Error::RpcError {
                code: RpcCode::AlreadyExists,
                ref msg,
            } => Status::already_exists(msg.clone()),
            Error::RpcError {
                code: RpcCode::InvalidParams,
                ref msg,
            } => Status::invalid_argument(msg.clone()),
            _ => Status::internal(self.to_string()),
        }
    }
}
