//! Ticking Cycle
//!
//! Runs on its own OS thread under the [`RateGovernor`]. Each tick reads the
//! mood clock, computes a frame and hands it to the output driver, which
//! this loop owns outright.
//!
//! A frame is only sent when it differs from the last one that reached the
//! strip, or when the mood generation moved on. Static moods therefore stop
//! streaming after their first frame.
//!
//! The startup and final all-off frames are rendered outside the governed
//! loop, so both are held to the same interval: the first tick waits one
//! interval after the startup frame, and the final frame waits one interval
//! after the last render.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::animation::{AnimationEngine, FrameBuffer};
use crate::driver::{DriverError, OutputDriver};
use crate::governor::{GovernorStats, RateGovernor, StopSignal};
use crate::state::DaemonState;

/// Name of the ticking thread
pub const TICKER_THREAD_NAME: &str = "halo-ticker";

/// Animation loop owning the output driver
#[derive(Debug)]
pub struct TickLoop {
    engine: AnimationEngine,
    driver: OutputDriver,
    state: Arc<DaemonState>,
    governor: RateGovernor,
    auto_off: Option<Duration>,
    last_frame: Option<FrameBuffer>,
    last_generation: Option<u64>,
    last_render_at: Option<Instant>,
}

impl TickLoop {
    /// Build a loop around an initialized driver
    #[must_use]
    pub fn new(
        engine: AnimationEngine,
        driver: OutputDriver,
        state: Arc<DaemonState>,
        governor: RateGovernor,
        auto_off: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            driver,
            state,
            governor,
            auto_off,
            last_frame: None,
            last_generation: None,
            last_render_at: None,
        }
    }

    /// Push an all-off frame before the first tick
    ///
    /// # Errors
    ///
    /// Whatever the driver reports; callers log it and continue.
    pub fn start_dark(&mut self) -> Result<(), DriverError> {
        let frame = self.engine.dark_frame();
        let generation = self.state.clock().generation;
        self.last_render_at = Some(Instant::now());
        self.driver.render(&frame)?;
        self.state.record_render(generation);
        self.last_frame = Some(frame);
        self.last_generation = Some(generation);
        Ok(())
    }

    /// One cycle: auto-off check, frame computation, render
    pub fn tick(&mut self, now: Instant) {
        if let Some(timeout) = self.auto_off {
            if let Some(change) = self.state.expire_idle(now, timeout) {
                tracing::info!(
                    previous = %change.previous,
                    idle_secs = timeout.as_secs(),
                    "Mood held too long, turning off"
                );
            }
        }

        let clock = self.state.clock();
        let frame = self.engine.frame(clock.mood, clock.elapsed(now));

        let same_generation = self.last_generation == Some(clock.generation);
        if same_generation && self.last_frame.as_ref() == Some(&frame) {
            return;
        }
        if !same_generation {
            tracing::debug!(
                mood = %clock.mood,
                generation = clock.generation,
                "Rendering new mood"
            );
        }

        // A failed transfer still used the bus
        self.last_render_at = Some(now);
        match self.driver.render(&frame) {
            Ok(()) => {
                self.state.record_render(clock.generation);
                self.last_frame = Some(frame);
                self.last_generation = Some(clock.generation);
            }
            Err(e) => {
                let failures = self.state.record_transfer_failure();
                tracing::warn!(error = %e, failures, "Frame render failed, retrying next tick");
            }
        }
    }

    /// Drive ticks until `stop` is raised, then go dark and release the driver
    pub fn run(mut self, stop: &StopSignal) -> GovernorStats {
        let governor = self.governor;
        tracing::debug!(
            interval_ms = governor.interval().as_millis() as u64,
            "Ticking started"
        );

        let first = self.earliest_render().unwrap_or_else(Instant::now);
        let stats = governor.run_from(first, |now| self.tick(now), stop);
        self.finish();

        tracing::info!(
            ticks = stats.ticks,
            overruns = stats.overruns,
            frames = self.state.frames_rendered(),
            "Ticking stopped"
        );
        stats
    }

    /// Run on a dedicated thread
    ///
    /// # Errors
    ///
    /// Fails only if the OS refuses to spawn the thread.
    pub fn spawn(self, stop: StopSignal) -> std::io::Result<JoinHandle<GovernorStats>> {
        thread::Builder::new()
            .name(TICKER_THREAD_NAME.to_string())
            .spawn(move || self.run(&stop))
    }

    /// First instant the next frame may reach the strip
    fn earliest_render(&self) -> Option<Instant> {
        self.last_render_at.map(|at| at + self.governor.interval())
    }

    fn finish(&mut self) {
        if let Some(earliest) = self.earliest_render() {
            // The stop signal is already raised; wait on a fresh one
            StopSignal::new().wait_until(earliest);
        }

        let dark = self.engine.dark_frame();
        match self.driver.render(&dark) {
            Ok(()) => {
                self.state.record_render(self.state.clock().generation);
                self.last_frame = Some(dark);
            }
            Err(e) => tracing::warn!(error = %e, "Could not render final off frame"),
        }
        self.driver.shutdown();
    }
}
