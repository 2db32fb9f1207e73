//! json-rpc protocol over unix domain socket implementation as described
//! in spec: https://www.jsonrpc.org/specification.
//!
//! One request per `\n`-terminated line, one response per line. Request ids
//! start at 1 and increment by 1 for the lifetime of the connection; replies
//! may arrive out of order and are matched back to callers by id. A call
//! abandoned by its caller (deadline) leaves its id reserved; if the late
//! reply eventually shows up the connection is marked unhealthy and every
//! later call fails fast.

pub mod error;
pub mod spdk;
#[cfg(test)]
mod test;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        unix::{OwnedReadHalf, OwnedWriteHalf},
        UnixStream,
    },
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{error, trace, warn};

use self::error::{Error, RpcCode};

/// A JSONRPC request object. Field order is the wire order.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request<'a> {
    /// jsonrpc field, MUST be "2.0"
    pub jsonrpc: &'a str,
    /// Identifier for this Request, which should appear in the response
    pub id: u64,
    /// The name of the RPC call
    pub method: &'a str,
    /// Parameters to the RPC call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A JSONRPC response object
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// A result if there is one, or null
    pub result: Option<serde_json::Value>,
    /// An error if there is one, or null
    pub error: Option<RpcError>,
    /// Identifier for this Request, which should match that of the request
    pub id: serde_json::Value,
    /// jsonrpc field, MUST be "2.0"
    pub jsonrpc: Option<String>,
}

/// A JSONRPC error object
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    /// The integer identifier of the error
    pub code: i32,
    /// A string describing the error
    pub message: String,
    /// Additional data specific to the error
    pub data: Option<serde_json::Value>,
}

type ReplySender = oneshot::Sender<Result<serde_json::Value, Error>>;

struct Pending {
    calls: HashMap<u64, ReplySender>,
    /// Set once the reader saw EOF, garbage, or a reply nobody waits for.
    dead: bool,
}

struct Shared {
    pending: Mutex<Pending>,
}

impl Shared {
    /// Fail every in-flight call and refuse new ones.
    fn poison(&self, err: impl Fn() -> Error) {
        let mut pending = self.pending.lock().unwrap();
        pending.dead = true;
        for (_, tx) in pending.calls.drain() {
            let _ = tx.send(Err(err()));
        }
    }
}

/// Client side of one json-rpc connection to the storage daemon.
pub struct Client {
    next_id: AtomicU64,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

impl Client {
    /// Connect to the daemon's unix domain socket.
    pub async fn connect(sock_path: &str) -> Result<Self, Error> {
        let sock = UnixStream::connect(sock_path).await.map_err(|err| {
            Error::ConnectError {
                sock: sock_path.to_string(),
                source: err,
            }
        })?;
        Ok(Self::new(sock))
    }

    /// Wrap an already connected stream.
    pub fn new(sock: UnixStream) -> Self {
        let (read_half, write_half) = sock.into_split();
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending {
                calls: HashMap::new(),
                dead: false,
            }),
        });
        let reader = tokio::spawn(read_replies(read_half, Arc::clone(&shared)));
        Self {
            next_id: AtomicU64::new(1),
            writer: tokio::sync::Mutex::new(write_half),
            shared,
            reader,
        }
    }

    /// Make a json-rpc request and return the decoded result to the caller.
    ///
    /// Dropping the returned future (e.g. from `tokio::time::timeout`) does
    /// not corrupt the id space, the id simply stays reserved.
    pub async fn call<A, R>(
        &self,
        method: &str,
        args: Option<A>,
    ) -> Result<R, Error>
    where
        A: serde::ser::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let params = match args {
            Some(val) => {
                Some(serde_json::to_value(val).map_err(Error::ParseError)?)
            }
            None => None,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut request_raw =
            serde_json::to_vec(&request).map_err(Error::ParseError)?;
        request_raw.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.dead {
                return Err(Error::ConnectionLost);
            }
            pending.calls.insert(id, tx);
        }

        trace!("JSON request: {}", String::from_utf8_lossy(&request_raw));

        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.write_all(&request_raw).await {
                self.shared.pending.lock().unwrap().calls.remove(&id);
                return Err(err.into());
            }
        }

        let reply = match rx.await {
            Ok(reply) => reply?,
            // reader task went away without failing the call explicitly
            Err(_) => return Err(Error::ConnectionLost),
        };
        serde_json::from_value(reply).map_err(Error::ParseError)
    }

    /// Like [`call`](Self::call) but the result payload is discarded. Used
    /// for methods whose result carries no information (the daemon answers
    /// `true` or an arbitrary echo).
    pub async fn call_void<A>(
        &self,
        method: &str,
        args: Option<A>,
    ) -> Result<(), Error>
    where
        A: serde::ser::Serialize,
    {
        self.call::<A, serde_json::Value>(method, args)
            .await
            .map(|_| ())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_replies(read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                shared.poison(|| Error::ConnectionLost);
                return;
            }
            Err(err) => {
                let kind = err.kind();
                shared
                    .poison(move || Error::IoError(std::io::Error::from(kind)));
                return;
            }
        };
        trace!("JSON response: {}", line);

        let (id, outcome) = match parse_reply(&line) {
            Ok(reply) => reply,
            Err(err) => {
                error!("Failed to parse json-rpc reply: {}", err);
                shared.poison(|| Error::ConnectionLost);
                return;
            }
        };

        let tx = shared.pending.lock().unwrap().calls.remove(&id);
        match tx {
            // the caller may have given up in the meantime; send failure
            // alone does not invalidate the connection
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                // a reply nobody waits for means a caller abandoned the id
                // earlier; request/response pairing can no longer be trusted
                warn!("Late json-rpc reply for id {}, closing", id);
                shared.poison(|| Error::ConnectionLost);
                return;
            }
        }
    }
}

/// Parse one json-rpc reply line and return the id it belongs to along with
/// the user payload or error.
fn parse_reply(
    line: &str,
) -> Result<(u64, Result<serde_json::Value, Error>), Error> {
    let reply: Response =
        serde_json::from_str(line).map_err(Error::ParseError)?;

    if let Some(vers) = &reply.jsonrpc {
        if vers != "2.0" {
            return Err(Error::InvalidVersion);
        }
    }
    let id = match reply.id.as_u64() {
        Some(id) => id,
        None => return Err(Error::InvalidReplyId),
    };

    if let Some(err) = reply.error {
        Ok((
            id,
            Err(Error::RpcError {
                code: RpcCode::from_code(err.code),
                msg: err.message,
            }),
        ))
    } else {
        // if there is no result fabricate null value == ()
        Ok((id, Ok(reply.result.unwrap_or(serde_json::Value::Null))))
    }
}
