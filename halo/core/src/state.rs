//! Shared Daemon State
//!
//! The one record both the ticking cycle and the control endpoint touch.
//! Only the mood, its clock origin and its generation live under the guard;
//! counters are atomics and the driver mode never changes after startup.
//! The guard is held for a field read or write, never across a render.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::driver::DriverMode;
use crate::messages::Status;
use crate::mood::Mood;

/// Mood plus the instant its animation started
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoodClock {
    /// Active mood
    pub mood: Mood,
    /// Animation phase zero
    pub origin: Instant,
    /// Accepted mood changes so far
    pub generation: u64,
}

impl MoodClock {
    /// Time since the mood was set, zero if `now` predates the origin
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.origin)
    }
}

/// Outcome of a mood transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoodChange {
    /// Mood before the change
    pub previous: Mood,
    /// Clock after the change
    pub clock: MoodClock,
}

/// State shared between the ticking cycle and the control endpoint
#[derive(Debug)]
pub struct DaemonState {
    clock: Mutex<MoodClock>,
    driver_mode: DriverMode,
    frames_rendered: AtomicU64,
    rendered_generation: AtomicU64,
    transfer_failures: AtomicU64,
    shutting_down: AtomicBool,
}

impl DaemonState {
    /// Fresh state: mood off, generation zero
    #[must_use]
    pub fn new(driver_mode: DriverMode) -> Self {
        Self {
            clock: Mutex::new(MoodClock {
                mood: Mood::Off,
                origin: Instant::now(),
                generation: 0,
            }),
            driver_mode,
            frames_rendered: AtomicU64::new(0),
            rendered_generation: AtomicU64::new(0),
            transfer_failures: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Switch mood and restart its animation
    ///
    /// Self-transitions are accepted and still reset the phase. The new
    /// origin is strictly later than the previous one even when the clock
    /// has not advanced between two calls.
    pub fn set_mood(&self, mood: Mood) -> MoodChange {
        let now = Instant::now();
        let mut clock = self.clock.lock();
        Self::transition(&mut clock, mood, now)
    }

    fn transition(clock: &mut MoodClock, mood: Mood, now: Instant) -> MoodChange {
        let previous = clock.mood;
        let origin = if now > clock.origin {
            now
        } else {
            clock.origin + Duration::from_nanos(1)
        };
        *clock = MoodClock {
            mood,
            origin,
            generation: clock.generation + 1,
        };
        MoodChange {
            previous,
            clock: *clock,
        }
    }

    /// Copy of the current clock
    #[must_use]
    pub fn clock(&self) -> MoodClock {
        *self.clock.lock()
    }

    /// Current mood
    #[must_use]
    pub fn mood(&self) -> Mood {
        self.clock.lock().mood
    }

    /// Turn off a lit mood that has been held for `timeout`
    ///
    /// Checked and applied under one guard, so a `set_mood` racing with the
    /// expiry either lands first (and restarts the timer) or wins afterwards.
    pub fn expire_idle(&self, now: Instant, timeout: Duration) -> Option<MoodChange> {
        let mut clock = self.clock.lock();
        if clock.mood == Mood::Off || clock.elapsed(now) < timeout {
            return None;
        }
        Some(Self::transition(&mut clock, Mood::Off, now))
    }

    /// Acquisition mode fixed at startup
    #[must_use]
    pub fn driver_mode(&self) -> DriverMode {
        self.driver_mode
    }

    /// Record a successful frame transfer for `generation`
    pub fn record_render(&self, generation: u64) {
        self.frames_rendered.fetch_add(1, Ordering::SeqCst);
        self.rendered_generation.fetch_max(generation, Ordering::SeqCst);
    }

    /// Record a failed frame transfer
    pub fn record_transfer_failure(&self) -> u64 {
        self.transfer_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Frames written so far
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::SeqCst)
    }

    /// Mark the daemon as tearing down
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// True once teardown has started
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Status for control replies
    #[must_use]
    pub fn status(&self) -> Status {
        let clock = self.clock();
        Status {
            mood: clock.mood.as_str().to_string(),
            exclusive: self.driver_mode.is_exclusive(),
            driver_mode: self.driver_mode.as_str().to_string(),
            dma_channel: self.driver_mode.channel(),
            generation: clock.generation,
            rendered_generation: self.rendered_generation.load(Ordering::SeqCst),
            frames_rendered: self.frames_rendered(),
            transfer_failures: self.transfer_failures.load(Ordering::SeqCst),
            shutting_down: self.is_shutting_down(),
        }
    }
}
