//! Output Driver - Hardware Access with Channel Isolation
//!
//! The driver is the only component that touches the LED peripheral. It is
//! owned by the ticking cycle; nothing on the control path holds a reference
//! to it.
//!
//! # Acquisition
//!
//! ```text
//! initialize()
//!     │
//!     ├─ acquire_exclusive(channel) ──ok──→ DriverMode::Exclusive { channel }
//!     │        │ err (busy / unavailable)
//!     │        ▼
//!     ├─ acquire_shared() ────────────ok──→ DriverMode::Shared      (degraded)
//!     │        │ err
//!     │        ▼
//!     └──────────────────────────────────→ DriverMode::Detached    (degraded)
//! ```
//!
//! The chosen mode is recorded as explicit state and reported back in an
//! [`Acquisition`], so the daemon can log it and expose it in status
//! replies. Acquisition never fails startup.

pub mod simulated;
pub mod spi;
pub mod ws281x;

pub use simulated::{RecordedFrame, SimulatedPeripheral};
pub use spi::SpiPeripheral;
pub use ws281x::Ws281xPeripheral;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::animation::{FrameBuffer, Rgb};
use crate::config::DeviceConfig;

/// Errors reported by the output driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// `render` called before `initialize`
    #[error("Output driver not initialized")]
    NotInitialized,

    /// A single transfer failed; the next tick may succeed
    #[error("Frame transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Frame length does not match the configured strip
    #[error("Frame has {actual} pixels, strip has {expected}")]
    FrameLength {
        /// Configured pixel count
        expected: usize,
        /// Pixels in the rejected frame
        actual: usize,
    },

    /// Driver already shut down
    #[error("Output driver is shutting down")]
    ShuttingDown,

    /// A peripheral refused an acquisition path
    #[error("{path} acquisition failed: {reason}")]
    AcquisitionFailed {
        /// Which path was attempted
        path: &'static str,
        /// Human-readable cause
        reason: String,
    },
}

impl DriverError {
    /// Build an acquisition failure from any displayable cause
    pub fn acquisition(path: &'static str, reason: impl fmt::Display) -> Self {
        Self::AcquisitionFailed {
            path,
            reason: reason.to_string(),
        }
    }
}

/// How the peripheral was acquired
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverMode {
    /// Transfer channel held exclusively
    Exclusive {
        /// Pinned transfer channel
        channel: u8,
    },
    /// Output works but the channel is not isolated
    Shared,
    /// No output; frames are discarded
    Detached,
}

impl DriverMode {
    /// Short name used in status replies
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exclusive { .. } => "exclusive",
            Self::Shared => "shared",
            Self::Detached => "detached",
        }
    }

    /// True only when the transfer channel is isolated
    #[must_use]
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive { .. })
    }

    /// Pinned channel, if any
    #[must_use]
    pub fn channel(self) -> Option<u8> {
        match self {
            Self::Exclusive { channel } => Some(channel),
            _ => None,
        }
    }
}

impl fmt::Display for DriverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive { channel } => write!(f, "exclusive (channel {channel})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of [`OutputDriver::initialize`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquisition {
    /// Mode the driver ended up in
    pub mode: DriverMode,
    /// Why exclusive access was not obtained, when degraded
    pub degraded_reason: Option<String>,
}

impl Acquisition {
    /// Shorthand for `mode.is_exclusive()`
    #[must_use]
    pub fn exclusive(&self) -> bool {
        self.mode.is_exclusive()
    }
}

/// Writable connection to the strip
pub trait PixelSink: Send {
    /// Push one frame; blocks for the duration of the transfer
    ///
    /// # Errors
    ///
    /// Any I/O error from the underlying device.
    fn write(&mut self, pixels: &[Rgb]) -> std::io::Result<()>;

    /// Release the device; called once from [`OutputDriver::shutdown`]
    fn close(&mut self) {}
}

/// Capability set of an LED peripheral
pub trait Peripheral: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Acquire with the given transfer channel held exclusively
    ///
    /// # Errors
    ///
    /// [`DriverError::AcquisitionFailed`] when the channel is busy or the
    /// backend cannot isolate it.
    fn acquire_exclusive(&self, channel: u8) -> Result<Box<dyn PixelSink>, DriverError>;

    /// Acquire without channel isolation
    ///
    /// # Errors
    ///
    /// [`DriverError::AcquisitionFailed`] when the device cannot be opened.
    fn acquire_shared(&self) -> Result<Box<dyn PixelSink>, DriverError>;
}

enum DriverState {
    Uninitialized,
    Ready {
        sink: Option<Box<dyn PixelSink>>,
        acquisition: Acquisition,
    },
    ShutDown,
}

/// Sole owner of the peripheral handle
pub struct OutputDriver {
    pixel_count: usize,
    dma_channel: u8,
    state: DriverState,
}

impl fmt::Debug for OutputDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDriver")
            .field("pixel_count", &self.pixel_count)
            .field("dma_channel", &self.dma_channel)
            .field("mode", &self.mode())
            .finish()
    }
}

impl OutputDriver {
    /// Create an uninitialized driver for the configured strip
    #[must_use]
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            pixel_count: config.pixel_count,
            dma_channel: config.dma_channel,
            state: DriverState::Uninitialized,
        }
    }

    /// Acquire the peripheral, falling back when exclusive access fails
    ///
    /// Calling this again on a ready driver returns the existing acquisition.
    ///
    /// # Errors
    ///
    /// [`DriverError::ShuttingDown`] after [`OutputDriver::shutdown`]. Failed
    /// acquisitions are not errors; they are reported as a degraded mode.
    pub fn initialize(&mut self, peripheral: &dyn Peripheral) -> Result<Acquisition, DriverError> {
        match &self.state {
            DriverState::ShutDown => return Err(DriverError::ShuttingDown),
            DriverState::Ready { acquisition, .. } => return Ok(acquisition.clone()),
            DriverState::Uninitialized => {}
        }

        let channel = self.dma_channel;
        let (sink, acquisition) = match peripheral.acquire_exclusive(channel) {
            Ok(sink) => {
                tracing::info!(backend = peripheral.name(), channel, "Acquired exclusive output");
                (
                    Some(sink),
                    Acquisition {
                        mode: DriverMode::Exclusive { channel },
                        degraded_reason: None,
                    },
                )
            }
            Err(exclusive_err) => {
                tracing::warn!(
                    backend = peripheral.name(),
                    channel,
                    error = %exclusive_err,
                    "Exclusive acquisition failed, falling back to shared output"
                );
                match peripheral.acquire_shared() {
                    Ok(sink) => (
                        Some(sink),
                        Acquisition {
                            mode: DriverMode::Shared,
                            degraded_reason: Some(exclusive_err.to_string()),
                        },
                    ),
                    Err(shared_err) => {
                        tracing::error!(
                            backend = peripheral.name(),
                            error = %shared_err,
                            "Shared acquisition failed, frames will be discarded"
                        );
                        (
                            None,
                            Acquisition {
                                mode: DriverMode::Detached,
                                degraded_reason: Some(format!("{exclusive_err}; {shared_err}")),
                            },
                        )
                    }
                }
            }
        };

        self.state = DriverState::Ready {
            sink,
            acquisition: acquisition.clone(),
        };
        Ok(acquisition)
    }

    /// Write one frame to the strip
    ///
    /// # Errors
    ///
    /// - [`DriverError::NotInitialized`] before `initialize`
    /// - [`DriverError::ShuttingDown`] after `shutdown`
    /// - [`DriverError::FrameLength`] for a frame of the wrong length
    /// - [`DriverError::TransferFailed`] when the device write fails
    pub fn render(&mut self, frame: &FrameBuffer) -> Result<(), DriverError> {
        let sink = match &mut self.state {
            DriverState::Uninitialized => return Err(DriverError::NotInitialized),
            DriverState::ShutDown => return Err(DriverError::ShuttingDown),
            DriverState::Ready { sink, .. } => sink,
        };

        if frame.len() != self.pixel_count {
            return Err(DriverError::FrameLength {
                expected: self.pixel_count,
                actual: frame.len(),
            });
        }

        match sink {
            Some(sink) => sink
                .write(frame.pixels())
                .map_err(DriverError::TransferFailed),
            None => Ok(()),
        }
    }

    /// Release the peripheral; further renders fail with `ShuttingDown`
    pub fn shutdown(&mut self) {
        let previous = std::mem::replace(&mut self.state, DriverState::ShutDown);
        if let DriverState::Ready {
            sink: Some(mut sink),
            ..
        } = previous
        {
            sink.close();
            tracing::debug!("Output driver released");
        }
    }

    /// Current mode, `None` before initialization or after shutdown
    #[must_use]
    pub fn mode(&self) -> Option<DriverMode> {
        match &self.state {
            DriverState::Ready { acquisition, .. } => Some(acquisition.mode),
            _ => None,
        }
    }
}
