//! Daemon Orchestration
//!
//! Wires the pieces together in startup order:
//!
//! 1. Acquire the peripheral (exclusive, shared, or detached)
//! 2. Render an all-off frame
//! 3. Bind the control socket
//! 4. Start the ticking thread under the rate governor
//!
//! and tears them down in reverse on [`RunningDaemon::shutdown`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::animation::AnimationEngine;
use crate::config::DaemonConfig;
use crate::control::MoodController;
use crate::driver::{Acquisition, DriverError, OutputDriver, Peripheral};
use crate::governor::{GovernorStats, RateGovernor, StopSignal, MIN_FRAME_INTERVAL};
use crate::messages::Status;
use crate::state::DaemonState;
use crate::ticker::TickLoop;
use crate::transport::unix_socket::{ControlServer, RunningServer, DEFAULT_SHUTDOWN_GRACE};
use crate::transport::TransportError;

/// Fatal startup and teardown failures
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Driver could not be brought up at all
    #[error("Output driver failed: {0}")]
    Driver(#[from] DriverError),

    /// Control socket could not be bound or removed
    #[error("Control socket error: {0}")]
    Transport(#[from] TransportError),

    /// Ticking thread could not be started
    #[error("Failed to start ticking thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Ticking thread panicked
    #[error("Ticking thread panicked")]
    TickerPanicked,
}

/// Daemon ready to start
#[derive(Debug, Clone)]
pub struct LedDaemon {
    config: DaemonConfig,
    min_interval: Duration,
    shutdown_grace: Duration,
}

impl LedDaemon {
    /// Daemon for a validated configuration
    #[must_use]
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            min_interval: MIN_FRAME_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Lower the frame interval floor (tests and benches only)
    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Time in-flight requests get during shutdown
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Bring the daemon up on `peripheral`
    ///
    /// Must be called from within a Tokio runtime. Failing to obtain the
    /// transfer channel exclusively is not an error; the degradation is
    /// logged and reported through status.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a control socket that cannot be bound, or a
    /// ticking thread that cannot be spawned.
    pub async fn start(self, peripheral: &dyn Peripheral) -> Result<RunningDaemon, DaemonError> {
        let config = self.config;
        config.validate()?;

        let mut driver = OutputDriver::new(&config.device);
        let acquisition = driver.initialize(peripheral)?;
        let state = Arc::new(DaemonState::new(acquisition.mode));

        let governor = RateGovernor::with_min_interval(config.device.max_fps, self.min_interval);
        let mut ticker = TickLoop::new(
            AnimationEngine::from_config(&config.device),
            driver,
            Arc::clone(&state),
            governor,
            config.auto_off,
        );
        if let Err(e) = ticker.start_dark() {
            warn!(error = %e, "Initial off frame failed");
        }

        let handler = Arc::new(MoodController::new(Arc::clone(&state)));
        let server = ControlServer::new(config.socket_path.clone(), handler).bind()?;

        let stop = StopSignal::new();
        let ticker = match ticker.spawn(stop.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(err) = server.shutdown(Duration::ZERO).await {
                    warn!(error = %err, "Failed to clean up control socket");
                }
                return Err(DaemonError::Spawn(e));
            }
        };

        report_startup(&config, peripheral.name(), &acquisition, governor);

        Ok(RunningDaemon {
            socket_path: config.socket_path,
            state,
            server: Some(server),
            stop,
            ticker: Some(ticker),
            shutdown_grace: self.shutdown_grace,
        })
    }
}

fn report_startup(
    config: &DaemonConfig,
    backend: &'static str,
    acquisition: &Acquisition,
    governor: RateGovernor,
) {
    let device = &config.device;
    info!(
        pixels = device.pixel_count,
        gpio_pin = device.gpio_pin,
        backend,
        mode = %acquisition.mode,
        exclusive = acquisition.exclusive(),
        brightness = device.brightness,
        max_fps = governor.effective_fps(),
        socket = ?config.socket_path,
        config_source = %config.source(),
        "LED daemon ready"
    );

    if let Some(reason) = &acquisition.degraded_reason {
        warn!(
            mode = %acquisition.mode,
            requested_channel = device.dma_channel,
            reason = %reason,
            "Exclusive transfer channel unavailable; audio isolation is not guaranteed"
        );
    }
    if device.uses_conflicting_channel() {
        warn!(
            channel = device.dma_channel,
            "Transfer channel 10 commonly conflicts with audio"
        );
    }
    if let Some(timeout) = config.auto_off {
        info!(auto_off_secs = timeout.as_secs(), "Auto-off enabled");
    }
}

/// Handle to a running daemon
#[derive(Debug)]
pub struct RunningDaemon {
    socket_path: PathBuf,
    state: Arc<DaemonState>,
    server: Option<RunningServer>,
    stop: StopSignal,
    ticker: Option<JoinHandle<GovernorStats>>,
    shutdown_grace: Duration,
}

impl RunningDaemon {
    /// Current status, as a `get_status` request would see it
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Path of the control socket
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Shared state, for embedding and tests
    #[must_use]
    pub fn state(&self) -> &Arc<DaemonState> {
        &self.state
    }

    /// Cooperative shutdown
    ///
    /// New requests are refused with `shutting_down`, the socket is closed
    /// and removed, then the ticking thread finishes its tick, renders an
    /// all-off frame and releases the driver.
    ///
    /// # Errors
    ///
    /// [`DaemonError::TickerPanicked`] if the ticking thread died. Socket
    /// cleanup failures are logged and do not stop the teardown.
    pub async fn shutdown(mut self) -> Result<GovernorStats, DaemonError> {
        info!("Shutting down LED daemon");
        self.state.begin_shutdown();

        if let Some(server) = self.server.take() {
            if let Err(e) = server.shutdown(self.shutdown_grace).await {
                warn!(error = %e, "Control socket cleanup failed");
            }
        }

        self.stop.stop();
        let Some(handle) = self.ticker.take() else {
            return Ok(GovernorStats::default());
        };
        let stats = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|_| DaemonError::TickerPanicked)?
            .map_err(|_| DaemonError::TickerPanicked)?;

        info!(
            ticks = stats.ticks,
            overruns = stats.overruns,
            "LED daemon stopped"
        );
        Ok(stats)
    }
}

impl Drop for RunningDaemon {
    fn drop(&mut self) {
        // Never leave the ticking thread behind
        self.stop.stop();
    }
}
