//! Control Socket Client
//!
//! Thin request/reply stub for the daemon's control socket. The assistant
//! process uses it (through [`MoodControl`]) to show what it is doing, and
//! `haloctl` uses it directly.
//!
//! The connection is opened lazily and reopened once if the daemon went away
//! between requests.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::messages::{ControlRequest, ControlResponse, ErrorCode, Status};
use crate::mood::Mood;
use crate::transport::frame::{encode, FrameDecoder};
use crate::transport::traits::TransportError;

/// Time allowed for one request round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Client-side failures
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Socket file does not exist
    #[error("LED daemon is not running (no socket at {0})")]
    DaemonNotRunning(PathBuf),

    /// Socket exists but nobody is accepting
    #[error("Connection refused at {0}")]
    ConnectionRefused(PathBuf),

    /// Round trip took too long
    #[error("No reply from LED daemon within {0:?}")]
    Timeout(Duration),

    /// Framing or I/O failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Daemon answered with an error
    #[error("Request rejected ({code}): {message}")]
    Rejected {
        /// Error code
        code: ErrorCode,
        /// Detail from the daemon
        message: String,
        /// Status sent along with the rejection
        status: Option<Box<Status>>,
    },

    /// Successful reply without a status body
    #[error("Reply carried no status")]
    MissingStatus,
}

impl ClientError {
    fn from_connect(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::DaemonNotRunning(path.to_path_buf()),
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused(path.to_path_buf()),
            _ => Self::Transport(TransportError::ConnectionFailed(format!(
                "Failed to connect to {}: {err}",
                path.display()
            ))),
        }
    }

    /// True when the daemon could not be reached at all
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::DaemonNotRunning(_) | Self::ConnectionRefused(_) | Self::Timeout(_)
        )
    }
}

/// Request/reply client for the LED daemon
#[derive(Debug)]
pub struct LedClient {
    socket_path: PathBuf,
    timeout: Duration,
    stream: Option<UnixStream>,
    decoder: FrameDecoder,
    last_mood: Option<Mood>,
}

impl LedClient {
    /// Client for the socket at `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
            stream: None,
            decoder: FrameDecoder::new(),
            last_mood: None,
        }
    }

    /// Client for [`super::default_socket_path`]
    #[must_use]
    pub fn with_default_path() -> Self {
        Self::new(super::default_socket_path())
    }

    /// Override the round-trip timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Socket this client talks to
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Open the connection now instead of on first request
    ///
    /// # Errors
    ///
    /// [`ClientError::DaemonNotRunning`] or [`ClientError::ConnectionRefused`]
    /// when the daemon is not there.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| ClientError::from_connect(&self.socket_path, e))?;
        tracing::debug!(path = ?self.socket_path, "Connected to LED daemon");
        self.stream = Some(stream);
        self.decoder.clear();
        Ok(())
    }

    /// Whether a connection is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop the connection
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Disconnected from LED daemon");
        }
        self.decoder.clear();
    }

    /// Send one request and wait for its reply
    ///
    /// A stale connection is reopened and the request retried once.
    ///
    /// # Errors
    ///
    /// Connection, timeout or framing failures. A reply with `ok == false` is
    /// returned as a response, not as an error.
    pub async fn request(
        &mut self,
        request: &ControlRequest,
    ) -> Result<ControlResponse, ClientError> {
        let reused = self.stream.is_some();
        match self.round_trip(request).await {
            Err(ClientError::Transport(e)) if reused => {
                tracing::debug!(error = %e, "Stale connection, reconnecting");
                self.round_trip(request).await
            }
            other => other,
        }
    }

    async fn round_trip(
        &mut self,
        request: &ControlRequest,
    ) -> Result<ControlResponse, ClientError> {
        self.connect().await?;
        let frame = encode(request)?;
        let timeout = self.timeout;

        let result = tokio::time::timeout(timeout, self.exchange(&frame)).await;
        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.disconnect();
                Err(ClientError::Transport(e))
            }
            Err(_) => {
                self.disconnect();
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    async fn exchange(&mut self, frame: &[u8]) -> Result<ControlResponse, TransportError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("Not connected".to_string()))?;
        stream.write_all(frame).await?;

        let mut buf = [0u8; 4096];
        loop {
            if let Some(response) = self.decoder.decode::<ControlResponse>()? {
                return Ok(response);
            }
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.decoder.push(&buf[..n]);
        }
    }

    /// Send a request and require success
    async fn expect_status(&mut self, request: &ControlRequest) -> Result<Status, ClientError> {
        let response = self.request(request).await?;
        if !response.ok {
            let (code, message) = response.error.map_or(
                (ErrorCode::MalformedRequest, "rejected without detail".to_string()),
                |e| (e.code, e.message),
            );
            return Err(ClientError::Rejected {
                code,
                message,
                status: response.status.map(Box::new),
            });
        }
        response.status.ok_or(ClientError::MissingStatus)
    }

    /// Switch the daemon to `mood`
    ///
    /// # Errors
    ///
    /// See [`LedClient::request`]; rejections become [`ClientError::Rejected`].
    pub async fn set_mood(&mut self, mood: Mood) -> Result<Status, ClientError> {
        let status = self.expect_status(&ControlRequest::set_mood(mood)).await?;
        self.last_mood = Some(mood);
        Ok(status)
    }

    /// Switch by name, leaving validation to the daemon
    ///
    /// # Errors
    ///
    /// An unknown name comes back as [`ClientError::Rejected`] with
    /// [`ErrorCode::UnknownMood`].
    pub async fn set_mood_named(&mut self, name: &str) -> Result<Status, ClientError> {
        let status = self
            .expect_status(&ControlRequest::set_mood_named(name))
            .await?;
        self.last_mood = status.mood().ok();
        Ok(status)
    }

    /// Current daemon status
    ///
    /// # Errors
    ///
    /// See [`LedClient::request`].
    pub async fn status(&mut self) -> Result<Status, ClientError> {
        let status = self.expect_status(&ControlRequest::get_status()).await?;
        self.last_mood = status.mood().ok();
        Ok(status)
    }

    /// Set `mood` unless this client already set it
    ///
    /// Returns `false` when nothing was sent. Another client may have changed
    /// the mood since; use [`LedClient::set_mood`] to force it.
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn ensure_mood(&mut self, mood: Mood) -> Result<bool, ClientError> {
        if self.last_mood == Some(mood) {
            return Ok(false);
        }
        self.set_mood(mood).await?;
        Ok(true)
    }

    /// Last mood this client set or observed
    #[must_use]
    pub fn last_mood(&self) -> Option<Mood> {
        self.last_mood
    }

    /// Shorthand for `set_mood(Mood::Off)`
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn off(&mut self) -> Result<Status, ClientError> {
        self.set_mood(Mood::Off).await
    }

    /// Shorthand for `set_mood(Mood::Idle)`
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn idle(&mut self) -> Result<Status, ClientError> {
        self.set_mood(Mood::Idle).await
    }

    /// Shorthand for `set_mood(Mood::Listening)`
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn listening(&mut self) -> Result<Status, ClientError> {
        self.set_mood(Mood::Listening).await
    }

    /// Shorthand for `set_mood(Mood::Thinking)`
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn thinking(&mut self) -> Result<Status, ClientError> {
        self.set_mood(Mood::Thinking).await
    }

    /// Shorthand for `set_mood(Mood::Speaking)`
    ///
    /// # Errors
    ///
    /// See [`LedClient::set_mood`].
    pub async fn speaking(&mut self) -> Result<Status, ClientError> {
        self.set_mood(Mood::Speaking).await
    }
}

/// Mood signalling as seen by the assistant process
///
/// Lets callers run with or without LED hardware behind the same interface.
#[async_trait]
pub trait MoodControl: Send {
    /// Show `mood`
    async fn request_mood(&mut self, mood: Mood) -> Result<(), ClientError>;

    /// Mood currently shown, if known
    async fn current_mood(&mut self) -> Result<Option<Mood>, ClientError>;
}

#[async_trait]
impl MoodControl for LedClient {
    async fn request_mood(&mut self, mood: Mood) -> Result<(), ClientError> {
        self.ensure_mood(mood).await.map(|_| ())
    }

    async fn current_mood(&mut self) -> Result<Option<Mood>, ClientError> {
        Ok(self.status().await?.mood().ok())
    }
}

/// Stand-in used when no LED daemon is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMoodControl {
    mood: Option<Mood>,
}

#[async_trait]
impl MoodControl for NoopMoodControl {
    async fn request_mood(&mut self, mood: Mood) -> Result<(), ClientError> {
        self.mood = Some(mood);
        Ok(())
    }

    async fn current_mood(&mut self) -> Result<Option<Mood>, ClientError> {
        Ok(self.mood)
    }
}
