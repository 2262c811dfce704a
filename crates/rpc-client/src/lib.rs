//! rpc-client — connect, find, call, close. One connection per `Client`,
//! serialized access from the owning caller; there is no internal locking
//! because the protocol forbids multiplexing concurrent calls over one
//! connection.

use rpc_core::framing::{get_i32, get_u64, put_bytes, put_i32, put_u64};
use rpc_core::payload::{read_payload, write_payload, MAX_BLOB_LEN};
use rpc_core::Payload;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const FIND_TAG: i32 = 0;
const CALL_TAG: i32 = 1;

/// Opaque token returned by [`Client::find`], naming a registered
/// procedure by its DJB2 id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub function_id: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {0}:{1}: {2}")]
    Connect(String, u16, std::io::Error),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload codec error: {0}")]
    Payload(#[from] rpc_core::PayloadError),
}

pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Resolve `addr` and connect over IPv6 TCP.
    pub async fn connect(addr: &str, port: u16) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((addr, port))
            .await
            .map_err(|e| ClientError::Connect(addr.to_string(), port, e))?;
        tracing::debug!(addr, port, "connected to rpc server");
        Ok(Self { stream })
    }

    /// Look up `name` on the server. Returns `None` on a miss; the
    /// connection remains usable for further requests either way.
    pub async fn find(&mut self, name: &str) -> Result<Option<Handle>, ClientError> {
        put_i32(&mut self.stream, FIND_TAG).await?;
        put_u64(&mut self.stream, name.len() as u64).await?;
        put_bytes(&mut self.stream, name.as_bytes()).await?;

        let flag = get_i32(&mut self.stream).await?;
        if flag != 0 {
            return Ok(None);
        }
        let function_id = get_u64(&mut self.stream).await?;
        Ok(Some(Handle { function_id }))
    }

    /// Invoke the procedure named by `handle` with `payload`. Returns
    /// `None` if the handle is unknown to the server (a stale handle from
    /// a restarted server, for instance) or if the handler itself
    /// produced a null response.
    pub async fn call(
        &mut self,
        handle: &Handle,
        payload: &Payload,
    ) -> Result<Option<Payload>, ClientError> {
        put_i32(&mut self.stream, CALL_TAG).await?;
        put_u64(&mut self.stream, handle.function_id).await?;

        let verification_flag = get_i32(&mut self.stream).await?;
        if verification_flag < 0 {
            return Ok(None);
        }

        write_payload(&mut self.stream, Some(payload), MAX_BLOB_LEN).await?;
        let response = read_payload(&mut self.stream, MAX_BLOB_LEN).await?;
        Ok(response)
    }

    /// Close the connection and release the handle.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
