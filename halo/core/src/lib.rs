//! Halo Core - Audio-Safe LED Mood Engine
//!
//! Drives a WS2812 strip that shows what the voice assistant is doing
//! (idle, listening, thinking, speaking) without starving the audio path of
//! bus time. The privileged daemon owns the hardware; everything else talks
//! to it over a local socket.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐        ┌──────────────────────────────────────────┐
//! │ assistant / haloctl  │        │                  halod                   │
//! │                      │ socket │                                          │
//! │  LedClient ──────────┼───────►│ ControlServer ─► MoodController          │
//! │  (MoodControl)       │◄───────┤                      │                   │
//! └──────────────────────┘        │                      ▼                   │
//!                                 │               DaemonState (guard)        │
//!                                 │                      ▲                   │
//!                                 │                      │ read mood         │
//!                                 │ RateGovernor ─► TickLoop ─► Animation    │
//!                                 │                      │        Engine     │
//!                                 │                      ▼                   │
//!                                 │                OutputDriver ─► strip     │
//!                                 └──────────────────────────────────────────┘
//! ```
//!
//! # Module Overview
//!
//! - [`mood`]: Mood table and waveform descriptors
//! - [`animation`]: Pure frame computation from (mood, elapsed)
//! - [`governor`]: Frame-rate floor and stop signal
//! - [`driver`]: Peripheral acquisition with exclusive/shared fallback
//! - [`state`]: The one guarded record shared by both loops
//! - [`ticker`]: Ticking cycle that owns the driver
//! - [`messages`]: Control request/response payloads
//! - [`transport`]: Framing, socket server and client stub
//! - [`control`]: Request handling against the shared state
//! - [`daemon`]: Startup and shutdown orchestration
//! - [`config`]: TOML, environment and CLI configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod config;
pub mod control;
pub mod daemon;
pub mod driver;
pub mod governor;
pub mod messages;
pub mod mood;
pub mod state;
pub mod ticker;
pub mod transport;

// Re-exports for convenience
pub use animation::{AnimationEngine, FrameBuffer, Rgb};
pub use config::{
    load_config, load_config_from_path, resolve_config, ConfigError, ConfigOverrides,
    ConfigSource, DaemonConfig, DeviceConfig, OutputKind,
};
pub use control::MoodController;
pub use daemon::{DaemonError, LedDaemon, RunningDaemon};
pub use driver::{
    Acquisition, DriverError, DriverMode, OutputDriver, Peripheral, PixelSink,
    SimulatedPeripheral, SpiPeripheral, Ws281xPeripheral,
};
pub use governor::{RateGovernor, StopSignal, MIN_FRAME_INTERVAL};
pub use messages::{ControlOp, ControlRequest, ControlResponse, ErrorCode, Status, WireError};
pub use mood::{Mood, MoodDescriptor, Motion, UnknownMood};
pub use state::DaemonState;

#[cfg(unix)]
pub use transport::unix_socket::{
    default_socket_path, ClientError, LedClient, MoodControl, NoopMoodControl,
};
