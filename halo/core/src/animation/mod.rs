//! Animation Engine - Mood Waveforms to Pixel Buffers
//!
//! The engine turns `(mood, elapsed)` into a full frame. It holds no clock
//! and no current mood: the daemon's ticking cycle owns both and asks the
//! engine for a frame each tick, which keeps [`AnimationEngine::frame`] a
//! pure function that tests can drive with any elapsed value.
//!
//! # Architecture
//!
//! ```text
//! Mood ──descriptor()──→ MoodDescriptor
//!                             │
//!        elapsed ─→ waveform::{breathe_level, spin_head, trail_level}
//!                             │  normalized levels, one per pixel
//!                             ▼
//!                 color::pixel(hue, level, brightness)
//!                             │
//!                             ▼
//!                        FrameBuffer ──→ OutputDriver::render
//! ```

pub mod color;
pub mod waveform;

pub use color::{Rgb, BLACK};

use std::time::Duration;

use crate::config::DeviceConfig;
use crate::mood::{Mood, Motion};

/// One full update of every pixel on the strip
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer(Vec<Rgb>);

impl FrameBuffer {
    /// All-off frame of the given length
    #[must_use]
    pub fn dark(pixel_count: usize) -> Self {
        Self(vec![BLACK; pixel_count])
    }

    /// Wrap an existing pixel sequence
    #[must_use]
    pub fn from_pixels(pixels: Vec<Rgb>) -> Self {
        Self(pixels)
    }

    /// Pixels in strip order
    #[must_use]
    pub fn pixels(&self) -> &[Rgb] {
        &self.0
    }

    /// Number of pixels
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the frame has no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every pixel is fully off
    #[must_use]
    pub fn is_dark(&self) -> bool {
        self.0.iter().all(|px| *px == BLACK)
    }
}

/// Computes frames for a fixed strip length and brightness scalar
#[derive(Clone, Debug)]
pub struct AnimationEngine {
    pixel_count: usize,
    brightness: f32,
}

impl AnimationEngine {
    /// Create an engine for `pixel_count` pixels
    ///
    /// `brightness` is the global scalar, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn new(pixel_count: usize, brightness: f32) -> Self {
        let brightness = if brightness.is_nan() {
            0.0
        } else {
            brightness.clamp(0.0, 1.0)
        };
        Self {
            pixel_count,
            brightness,
        }
    }

    /// Create an engine from validated device settings
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.pixel_count, config.brightness)
    }

    /// Global brightness scalar
    #[must_use]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// All-off frame for this strip
    #[must_use]
    pub fn dark_frame(&self) -> FrameBuffer {
        FrameBuffer::dark(self.pixel_count)
    }

    /// Normalized per-pixel levels before the brightness scalar
    #[must_use]
    pub fn levels(&self, mood: Mood, elapsed: Duration) -> Vec<f32> {
        let d = mood.descriptor();
        let n = self.pixel_count;

        match d.motion {
            Motion::Static => vec![d.max; n],
            Motion::Breathe { period } => {
                vec![waveform::breathe_level(d.min, d.max, period, elapsed); n]
            }
            Motion::Spin { period, trail } => {
                let mut levels = vec![0.0; n];
                if n == 0 {
                    return levels;
                }
                let head = waveform::spin_head(n, period, elapsed);
                // Trail longer than the strip would wrap onto the head
                for distance in 0..trail.min(n) {
                    let idx = (head + n - distance) % n;
                    levels[idx] = waveform::trail_level(d.max, trail, distance);
                }
                levels
            }
        }
    }

    /// Frame for `mood` at `elapsed` since the mood was set
    #[must_use]
    pub fn frame(&self, mood: Mood, elapsed: Duration) -> FrameBuffer {
        let hue = mood.descriptor().hue;
        let pixels = self
            .levels(mood, elapsed)
            .into_iter()
            .map(|level| color::pixel(hue, level, self.brightness))
            .collect();
        FrameBuffer(pixels)
    }
}
