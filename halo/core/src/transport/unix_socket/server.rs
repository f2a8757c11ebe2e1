//! Control Socket Server
//!
//! Accepts any number of client connections and answers their requests one
//! at a time per connection through a shared [`ControlHandler`].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::messages::{ControlRequest, ControlResponse, ErrorCode, WireError};
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::{ConnectionId, ControlHandler, TransportError};

/// Socket mode: any local user may connect
pub const SOCKET_MODE: u32 = 0o666;

/// Time in-flight requests get to finish during shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Connection state tracking
struct ConnectionState {
    /// When the connection was established
    connected_at: Instant,
    /// Remote peer UID (from `SO_PEERCRED`)
    peer_uid: Option<u32>,
    /// Handle to abort the connection task
    abort_handle: tokio::task::AbortHandle,
}

/// Snapshot of one live connection
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// When the connection was established
    pub connected_at: Instant,
    /// Peer UID, when the platform reports it
    pub peer_uid: Option<u32>,
}

/// Unbound control server
pub struct ControlServer {
    socket_path: PathBuf,
    handler: Arc<dyn ControlHandler>,
}

impl ControlServer {
    /// Create a server that will listen on `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>, handler: Arc<dyn ControlHandler>) -> Self {
        Self {
            socket_path: socket_path.into(),
            handler,
        }
    }

    /// Prepare the socket path (create directory, remove stale socket)
    fn prepare_socket(&self) -> Result<(), TransportError> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                info!(path = ?parent, "Created socket directory");
            }
        }

        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            fs::remove_file(&self.socket_path)?;
        }

        Ok(())
    }

    /// Bind the socket and start accepting connections
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or its permissions
    /// cannot be set.
    pub fn bind(self) -> Result<RunningServer, TransportError> {
        self.prepare_socket()?;

        let listener = UnixListener::bind(&self.socket_path)?;
        fs::set_permissions(&self.socket_path, fs::Permissions::from_mode(SOCKET_MODE))?;

        info!(path = ?self.socket_path, "Listening for control connections");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection_states = Arc::new(DashMap::new());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.handler,
            Arc::clone(&connection_states),
            shutdown_rx,
        ));

        Ok(RunningServer {
            socket_path: self.socket_path,
            shutdown_tx,
            accept_task,
            connection_states,
        })
    }
}

/// Handle to a bound, accepting server
pub struct RunningServer {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("socket_path", &self.socket_path)
            .field("connections", &self.connection_states.len())
            .finish_non_exhaustive()
    }
}

impl RunningServer {
    /// Path of the listening socket
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get number of active connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_states.len()
    }

    /// Per-connection statistics
    #[must_use]
    pub fn connection_stats(&self) -> Vec<(ConnectionId, ConnectionStats)> {
        self.connection_states
            .iter()
            .map(|r| {
                (
                    r.key().clone(),
                    ConnectionStats {
                        connected_at: r.value().connected_at,
                        peer_uid: r.value().peer_uid,
                    },
                )
            })
            .collect()
    }

    /// Stop accepting, let in-flight requests finish, then close everything
    ///
    /// The caller is expected to have flagged the handler as shutting down
    /// first, so requests arriving during the grace period are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket file exists but cannot be removed.
    pub async fn shutdown(self, grace: Duration) -> Result<(), TransportError> {
        info!(connections = self.connection_count(), "Stopping control server");

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.accept_task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        if !self.connection_states.is_empty() {
            tokio::time::sleep(grace).await;
        }

        let conn_ids: Vec<ConnectionId> = self
            .connection_states
            .iter()
            .map(|r| r.key().clone())
            .collect();
        for conn_id in conn_ids {
            if let Some((_, conn_state)) = self.connection_states.remove(&conn_id) {
                debug!(conn_id = %conn_id, "Aborting connection");
                conn_state.abort_handle.abort();
            }
        }

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path)?;
            info!(path = ?self.socket_path, "Socket file removed");
        }

        Ok(())
    }
}

fn peer_uid(stream: &UnixStream) -> Option<u32> {
    stream.peer_cred().ok().map(|cred| cred.uid())
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<dyn ControlHandler>,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Shutdown requested, stopping accept loop");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
            }
        };

        let peer_uid = peer_uid(&stream);
        let conn_id = ConnectionId::new();

        info!(
            conn_id = %conn_id,
            peer_uid = ?peer_uid,
            active_connections = connection_states.len() + 1,
            "New connection accepted"
        );

        // The handler waits for its entry to exist, so its own removal on
        // exit can never run before the insert below.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let task_handle = tokio::spawn(
            handle_connection(
                conn_id.clone(),
                stream,
                Arc::clone(&handler),
                Arc::clone(&connection_states),
                registered_rx,
            )
            .instrument(tracing::info_span!("connection", %conn_id)),
        );

        connection_states.insert(
            conn_id,
            ConnectionState {
                connected_at: Instant::now(),
                peer_uid,
                abort_handle: task_handle.abort_handle(),
            },
        );
        let _ = registered_tx.send(());
    }
    // listener dropped here: no further connections
}

/// Serve one client until EOF, a fatal framing error, or abort
async fn handle_connection(
    conn_id: ConnectionId,
    mut stream: UnixStream,
    handler: Arc<dyn ControlHandler>,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    registered: oneshot::Receiver<()>,
) {
    let _ = registered.await;
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    'conn: loop {
        let n = match stream.read(&mut read_buf).await {
            Ok(0) => {
                debug!("Client disconnected (EOF)");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        };
        decoder.push(&read_buf[..n]);

        loop {
            let (response, fatal) = match decoder.decode::<serde_json::Value>() {
                Ok(Some(value)) => {
                    let response = match ControlRequest::from_value(value) {
                        Ok(request) => {
                            debug!(request = ?request.op, "Request received");
                            handler.handle(request)
                        }
                        Err(wire) => {
                            warn!(code = %wire.code, message = %wire.message, "Rejected request");
                            handler.reject(wire)
                        }
                    };
                    (response, false)
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to decode request frame");
                    let fatal = !e.is_recoverable();
                    let wire = WireError::new(ErrorCode::MalformedRequest, e.to_string());
                    (handler.reject(wire), fatal)
                }
            };

            if let Err(e) = write_response(&mut stream, &response).await {
                warn!(error = %e, "Write error");
                break 'conn;
            }
            if fatal {
                debug!("Closing connection after unrecoverable framing error");
                break 'conn;
            }
        }
    }

    connection_states.remove(&conn_id);
    debug!(
        active_connections = connection_states.len(),
        "Connection handler finished"
    );
}

async fn write_response(
    stream: &mut UnixStream,
    response: &ControlResponse,
) -> Result<(), TransportError> {
    let frame = encode(response)?;
    stream.write_all(&frame).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ControlOp, Status};
    use crate::transport::frame::encode_raw;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Echoes the last requested mood name back as status
    #[derive(Default)]
    struct EchoHandler {
        mood: Mutex<String>,
    }

    impl EchoHandler {
        fn status(&self) -> Status {
            Status {
                mood: self.mood.lock().clone(),
                exclusive: false,
                driver_mode: "detached".to_string(),
                dma_channel: None,
                generation: 0,
                rendered_generation: 0,
                frames_rendered: 0,
                transfer_failures: 0,
                shutting_down: false,
            }
        }
    }

    impl ControlHandler for EchoHandler {
        fn handle(&self, request: ControlRequest) -> ControlResponse {
            if let ControlOp::SetMood { mood } = request.op {
                *self.mood.lock() = mood;
            }
            ControlResponse::ok(self.status())
        }

        fn reject(&self, error: WireError) -> ControlResponse {
            ControlResponse::error(error, Some(self.status()))
        }
    }

    async fn read_response(stream: &mut UnixStream) -> ControlResponse {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 1024];
        loop {
            if let Some(resp) = decoder.decode().unwrap() {
                return resp;
            }
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed before replying");
            decoder.push(&buf[..n]);
        }
    }

    fn start(dir: &TempDir) -> RunningServer {
        let path = dir.path().join("ctl.sock");
        ControlServer::new(path, Arc::new(EchoHandler::default()))
            .bind()
            .unwrap()
    }

    #[tokio::test]
    async fn test_socket_is_world_writable() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let mode = fs::metadata(server.socket_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);
        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_socket_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctl.sock");
        fs::write(&path, b"stale").unwrap();

        let server = ControlServer::new(path.clone(), Arc::new(EchoHandler::default()))
            .bind()
            .unwrap();
        assert!(UnixStream::connect(&path).await.is_ok());
        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_request_reply() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();

        let frame = encode(&ControlRequest::set_mood_named("thinking")).unwrap();
        stream.write_all(&frame).await.unwrap();
        let resp = read_response(&mut stream).await;
        assert!(resp.ok);
        assert_eq!(resp.status.unwrap().mood, "thinking");

        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_then_valid_on_same_connection() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();

        stream.write_all(&encode_raw(b"{not json").unwrap()).await.unwrap();
        let resp = read_response(&mut stream).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, ErrorCode::MalformedRequest);

        stream
            .write_all(&encode(&ControlRequest::get_status()).unwrap())
            .await
            .unwrap();
        assert!(read_response(&mut stream).await.ok);

        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_op() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();

        stream
            .write_all(&encode_raw(br#"{"op":"reboot"}"#).unwrap())
            .await
            .unwrap();
        let resp = read_response(&mut stream).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::UnsupportedOp);

        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_oversize_frame_replied_then_closed() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();

        let mut header = (u32::MAX).to_be_bytes().to_vec();
        header.extend_from_slice(&[0u8; 4]);
        stream.write_all(&header).await.unwrap();

        let resp = read_response(&mut stream).await;
        assert_eq!(resp.error.unwrap().code, ErrorCode::MalformedRequest);

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);

        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_tracks_live_connections() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let before = Instant::now();

        // A reply proves the connection is registered
        let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
        stream
            .write_all(&encode(&ControlRequest::get_status()).unwrap())
            .await
            .unwrap();
        read_response(&mut stream).await;

        assert_eq!(server.connection_count(), 1);
        let stats = server.connection_stats();
        assert_eq!(stats.len(), 1);
        assert!(stats[0].1.connected_at >= before);
        assert!(stats[0].1.peer_uid.is_some());

        drop(stream);
        for _ in 0..100 {
            if server.connection_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(server.connection_count(), 0);

        server.shutdown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket_and_refuses_connections() {
        let dir = TempDir::new().unwrap();
        let server = start(&dir);
        let path = server.socket_path().to_path_buf();

        let _client = UnixStream::connect(&path).await.unwrap();
        server.shutdown(Duration::from_millis(10)).await.unwrap();

        assert!(!path.exists());
        assert!(UnixStream::connect(&path).await.is_err());
    }
}
