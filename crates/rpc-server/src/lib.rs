//! rpc-server — listen socket, accept loop, per-connection worker, and the
//! find/call request dispatcher.
//!
//! One tokio task per accepted connection; the registry is built once
//! during setup and is read-only for the lifetime of `serve_all`, so
//! workers never contend on it beyond the `RwLock`'s own read path.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rpc_core::config::ServerConfig;
use rpc_core::framing::{get_bytes, get_i32, get_u64, put_i32, put_u64};
use rpc_core::payload::{read_payload, write_payload, MAX_BLOB_LEN};
use rpc_core::{Payload, RegisterError, Registry};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const FIND_TAG: i32 = 0;
const CALL_TAG: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to initialize listen socket: {0}")]
    Init(std::io::Error),
}

/// A bound, not-yet-serving RPC server. Call [`Server::register`] for each
/// procedure, then consume the server with [`Server::serve_all`].
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
    serving: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    connections: Arc<DashMap<u64, SocketAddr>>,
    next_conn_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl Server {
    /// Resolve the passive-any IPv6 address, bind with `SO_REUSEADDR`, and
    /// listen with at least a 10-connection backlog.
    pub async fn init(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, config.port));
        let socket =
            Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP)).map_err(ServerError::Init)?;
        socket.set_reuse_address(true).map_err(ServerError::Init)?;
        socket.set_nonblocking(true).map_err(ServerError::Init)?;
        socket.bind(&addr.into()).map_err(ServerError::Init)?;
        socket
            .listen(config.backlog.max(10) as i32)
            .map_err(ServerError::Init)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Init)?;

        tracing::info!(
            port = listener.local_addr().map(|a| a.port()).unwrap_or(0),
            "rpc-server listening"
        );

        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            serving: Arc::new(AtomicBool::new(false)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            connections: Arc::new(DashMap::new()),
            next_conn_id: Arc::new(AtomicU64::new(0)),
            timeout: config.timeout(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Register a named handler. Must be called before [`Server::serve_all`];
    /// calling it afterward is rejected rather than silently racing the
    /// registry's read lock.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Payload) -> Option<Payload> + Send + Sync + 'static,
    ) -> Result<u64, RegisterError> {
        if self.serving.load(Ordering::Acquire) {
            tracing::warn!("register called after serve_all had started; rejecting");
            return Err(RegisterError::AfterServeStarted);
        }
        self.registry.register(name, handler)
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Accept loop. Never returns; accept failures (including a stalled
    /// listener) are logged and do not stop the server.
    pub async fn serve_all(self) -> ! {
        self.serving.store(true, Ordering::Release);
        let registry = self.registry;
        let active_workers = self.active_workers;
        let connections = self.connections;
        let next_conn_id = self.next_conn_id;
        let timeout_dur = self.timeout;

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let registry = registry.clone();
                    let active_workers = active_workers.clone();
                    let connections = connections.clone();
                    let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
                    connections.insert(conn_id, peer_addr);
                    active_workers.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%peer_addr, conn_id, "accepted connection");

                    tokio::spawn(async move {
                        let _guard = WorkerGuard {
                            active_workers,
                            connections,
                            conn_id,
                        };
                        if let Err(e) = worker_loop(stream, registry, timeout_dur).await {
                            tracing::debug!(%peer_addr, conn_id, error = %e, "worker exited");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed; continuing");
                }
            }
        }
    }
}

/// Decrements the live-worker count and drops the connection's registry
/// entry even if the worker task panics mid-call.
struct WorkerGuard {
    active_workers: Arc<AtomicUsize>,
    connections: Arc<DashMap<u64, SocketAddr>>,
    conn_id: u64,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
        self.connections.remove(&self.conn_id);
    }
}

fn to_io_timeout(_: tokio::time::error::Elapsed) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out")
}

/// Repeatedly read a request tag and dispatch. Exits (closing the
/// connection) when a tag read fails or the tag is unrecognized.
async fn worker_loop(
    mut stream: TcpStream,
    registry: Arc<Registry>,
    timeout_dur: Duration,
) -> std::io::Result<()> {
    loop {
        let tag = match timeout(timeout_dur, get_i32(&mut stream)).await {
            Ok(Ok(tag)) => tag,
            Ok(Err(_)) | Err(_) => return Ok(()),
        };

        match tag {
            FIND_TAG => handle_find(&mut stream, &registry, timeout_dur).await?,
            CALL_TAG => handle_call(&mut stream, &registry, timeout_dur).await?,
            _ => return Ok(()),
        }
    }
}

async fn handle_find(
    stream: &mut TcpStream,
    registry: &Registry,
    t: Duration,
) -> std::io::Result<()> {
    let name_len = timeout(t, get_u64(stream)).await.map_err(to_io_timeout)??;
    let name_bytes = timeout(t, get_bytes(stream, name_len as usize))
        .await
        .map_err(to_io_timeout)??;
    let name = String::from_utf8_lossy(&name_bytes);

    match registry.find_by_name(&name) {
        Some(f) => {
            tracing::debug!(name = %name, id = %hex::encode(f.id.to_be_bytes()), "find hit");
            timeout(t, put_i32(stream, 0)).await.map_err(to_io_timeout)??;
            timeout(t, put_u64(stream, f.id)).await.map_err(to_io_timeout)??;
        }
        None => {
            tracing::debug!(name = %name, "find miss");
            timeout(t, put_i32(stream, -1)).await.map_err(to_io_timeout)??;
        }
    }
    Ok(())
}

/// On a handle miss or a failed payload read, only this call is aborted —
/// the verification/error flag is already sent and the worker loop goes
/// back to reading the next request tag. A genuinely desynced stream (a
/// half-read payload leaving framing misaligned) surfaces as the next tag
/// read failing on its own, which closes the connection the usual way.
async fn handle_call(
    stream: &mut TcpStream,
    registry: &Registry,
    t: Duration,
) -> std::io::Result<()> {
    let handle_id = timeout(t, get_u64(stream)).await.map_err(to_io_timeout)??;

    let found = match registry.find_by_id(handle_id) {
        Some(f) => f,
        None => {
            tracing::debug!(id = %hex::encode(handle_id.to_be_bytes()), "call against unknown handle");
            timeout(t, put_i32(stream, -1)).await.map_err(to_io_timeout)??;
            return Ok(());
        }
    };
    timeout(t, put_i32(stream, 0)).await.map_err(to_io_timeout)??;

    let request = match timeout(t, read_payload(stream, MAX_BLOB_LEN)).await {
        Ok(Ok(p)) => p,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "payload read failed; aborting this call");
            return Ok(());
        }
        Err(_) => {
            tracing::debug!("payload read timed out; aborting this call");
            return Ok(());
        }
    };

    let response = request.as_ref().and_then(|p| (found.handler)(p));

    timeout(t, write_payload(stream, response.as_ref(), MAX_BLOB_LEN))
        .await
        .map_err(to_io_timeout)??;
    Ok(())
}
