//! In-memory peripheral
//!
//! Records every frame with the instant it arrived. Used for dry runs
//! (`output = "simulated"`) and by the test suite to observe render timing
//! and to inject acquisition or transfer failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::{DriverError, Peripheral, PixelSink};
use crate::animation::{FrameBuffer, Rgb};

/// Frames kept before the oldest are dropped
const HISTORY_LIMIT: usize = 4096;

/// One frame as received by the simulated strip
#[derive(Clone, Debug)]
pub struct RecordedFrame {
    /// When the write happened
    pub at: Instant,
    /// Pixels written
    pub frame: FrameBuffer,
}

#[derive(Default)]
struct Inner {
    frames: Mutex<VecDeque<RecordedFrame>>,
    total_frames: AtomicUsize,
    acquisitions: AtomicUsize,
    refuse_exclusive: AtomicBool,
    refuse_shared: AtomicBool,
    fail_transfers: AtomicBool,
    closed: AtomicBool,
}

/// Peripheral backed by memory; clones share the same recording
#[derive(Clone, Default)]
pub struct SimulatedPeripheral {
    inner: Arc<Inner>,
}

impl SimulatedPeripheral {
    /// A peripheral that grants every acquisition
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse exclusive acquisition, as if the channel were busy
    #[must_use]
    pub fn refusing_exclusive(self) -> Self {
        self.inner.refuse_exclusive.store(true, Ordering::SeqCst);
        self
    }

    /// Refuse shared acquisition, as if the device were missing
    #[must_use]
    pub fn refusing_shared(self) -> Self {
        self.inner.refuse_shared.store(true, Ordering::SeqCst);
        self
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_transfers(&self, fail: bool) {
        self.inner.fail_transfers.store(fail, Ordering::SeqCst);
    }

    /// Successful writes since creation
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.inner.total_frames.load(Ordering::SeqCst)
    }

    /// Recent frames, oldest first
    #[must_use]
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.inner.frames.lock().iter().cloned().collect()
    }

    /// Most recent frame
    #[must_use]
    pub fn last_frame(&self) -> Option<RecordedFrame> {
        self.inner.frames.lock().back().cloned()
    }

    /// Number of granted acquisitions
    #[must_use]
    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// True once the sink was closed by the driver
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn grant(&self) -> Box<dyn PixelSink> {
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        Box::new(SimulatedSink {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Peripheral for SimulatedPeripheral {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn acquire_exclusive(&self, channel: u8) -> Result<Box<dyn PixelSink>, DriverError> {
        if self.inner.refuse_exclusive.load(Ordering::SeqCst) {
            return Err(DriverError::acquisition(
                "exclusive",
                format!("channel {channel} busy"),
            ));
        }
        Ok(self.grant())
    }

    fn acquire_shared(&self) -> Result<Box<dyn PixelSink>, DriverError> {
        if self.inner.refuse_shared.load(Ordering::SeqCst) {
            return Err(DriverError::acquisition("shared", "device unavailable"));
        }
        Ok(self.grant())
    }
}

struct SimulatedSink {
    inner: Arc<Inner>,
}

impl PixelSink for SimulatedSink {
    fn write(&mut self, pixels: &[Rgb]) -> std::io::Result<()> {
        if self.inner.fail_transfers.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("simulated transfer fault"));
        }
        let mut frames = self.inner.frames.lock();
        if frames.len() >= HISTORY_LIMIT {
            frames.pop_front();
        }
        frames.push_back(RecordedFrame {
            at: Instant::now(),
            frame: FrameBuffer::from_pixels(pixels.to_vec()),
        });
        self.inner.total_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
