//! Rate Governor - Frame Budget Enforcement
//!
//! Wraps the ticking cycle so the output driver is never driven faster than
//! `max(1/fps, MIN_FRAME_INTERVAL)`. The floor is the audio-safety budget:
//! LED transfers compete with audio for the same memory bus, and bursts of
//! back-to-back frames are what produce audible glitches.
//!
//! # Scheduling
//!
//! ```text
//! t0          t0+I          t1+I
//! │ tick ──┐  │             │
//! │        │  │ tick ───────┼──┐ (overran)
//! ▼        ▼  ▼             ▼  ▼
//! ├────────┤  ├─────────────┼──┤ next tick starts at once,
//!                              │ the schedule restarts from here
//! ```
//!
//! Deadlines are measured from the start of the previous tick. After an
//! overrun the next tick starts immediately and the schedule restarts from
//! that point; missed slots are dropped, never replayed. A caller that
//! rendered outside the loop passes its own first deadline to
//! [`RateGovernor::run_from`] so the floor also holds across that frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Shortest allowed gap between two frames (20 FPS)
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative stop flag that also wakes a sleeping governor
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Create an unset signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter
    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    /// True once [`StopSignal::stop`] was called
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep until `deadline` or until stopped
    ///
    /// Returns `true` if the signal was raised.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Counters collected over one [`RateGovernor::run`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GovernorStats {
    /// Ticks executed
    pub ticks: u64,
    /// Ticks that took longer than the interval
    pub overruns: u64,
    /// Longest single tick
    pub longest_tick: Duration,
}

/// Calls a tick function at most once per interval
#[derive(Clone, Copy, Debug)]
pub struct RateGovernor {
    interval: Duration,
}

impl RateGovernor {
    /// Governor for `fps` with the standard audio-safety floor
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self::with_min_interval(fps, MIN_FRAME_INTERVAL)
    }

    /// Governor with a custom floor
    ///
    /// A zero `fps` is treated as 1.
    #[must_use]
    pub fn with_min_interval(fps: u32, min_interval: Duration) -> Self {
        let per_frame = Duration::from_secs(1) / fps.max(1);
        Self {
            interval: per_frame.max(min_interval),
        }
    }

    /// Effective inter-frame interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Effective frames per second
    #[must_use]
    pub fn effective_fps(&self) -> f64 {
        1.0 / self.interval.as_secs_f64()
    }

    /// Run `tick` until `stop` is raised
    ///
    /// The first tick runs immediately. A tick in progress always completes;
    /// the stop signal is checked between ticks.
    pub fn run<F>(&self, tick: F, stop: &StopSignal) -> GovernorStats
    where
        F: FnMut(Instant),
    {
        self.run_from(Instant::now(), tick, stop)
    }

    /// Like [`RateGovernor::run`], with the first tick held until `first`
    pub fn run_from<F>(&self, first: Instant, mut tick: F, stop: &StopSignal) -> GovernorStats
    where
        F: FnMut(Instant),
    {
        let mut stats = GovernorStats::default();
        let mut next = first;

        loop {
            if stop.wait_until(next) {
                break;
            }

            let started = Instant::now();
            tick(started);
            let took = started.elapsed();

            stats.ticks += 1;
            stats.longest_tick = stats.longest_tick.max(took);
            if took > self.interval {
                stats.overruns += 1;
                tracing::debug!(
                    took_ms = took.as_millis() as u64,
                    interval_ms = self.interval.as_millis() as u64,
                    "Tick overran frame budget"
                );
            }

            next = started + self.interval;
        }

        stats
    }
}
