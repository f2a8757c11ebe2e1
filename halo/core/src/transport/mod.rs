//! Transport Layer for the Control Channel
//!
//! Framing, error vocabulary and the Unix socket endpoint. Nothing in here
//! knows about moods, pixels or the output driver; requests are handed to a
//! [`ControlHandler`] supplied by the daemon.

pub mod frame;
pub mod traits;
#[cfg(unix)]
pub mod unix_socket;

pub use frame::{encode, FrameDecoder, MAX_FRAME_SIZE};
pub use traits::{ConnectionId, ControlHandler, TransportError};

#[cfg(unix)]
pub use unix_socket::{
    default_socket_path, ClientError, ControlServer, LedClient, MoodControl, RunningServer,
};
