//! Unix Socket Control Channel
//!
//! # Socket Location
//!
//! Default: `/tmp/halo_led.sock`, overridable through configuration.
//!
//! # Security
//!
//! - Socket created with mode 0666 so unprivileged clients can reach a
//!   daemon running as root
//! - Peer UID recorded via `SO_PEERCRED` for the connection log
//! - No network exposure (Unix domain sockets only)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                    ┌─────────────────┐
//! │ assistant / CLI │                    │      halod      │
//! │                 │   ControlRequest   │                 │
//! │    LedClient    ├───────────────────►│  ControlServer  │
//! │                 │◄───────────────────┤                 │
//! │                 │  ControlResponse   │ ControlHandler  │
//! └─────────────────┘                    └─────────────────┘
//! ```

mod client;
mod server;

pub use client::{ClientError, LedClient, MoodControl, NoopMoodControl, DEFAULT_TIMEOUT};
pub use server::{
    ConnectionStats, ControlServer, RunningServer, DEFAULT_SHUTDOWN_GRACE, SOCKET_MODE,
};

use std::path::PathBuf;

/// Socket path used when nothing else is configured
#[must_use]
pub fn default_socket_path() -> PathBuf {
    PathBuf::from(crate::config::DEFAULT_SOCKET_PATH)
}
