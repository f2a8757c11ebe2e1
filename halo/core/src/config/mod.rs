//! Daemon Configuration
//!
//! Device and control-channel settings, read once at startup and never
//! mutated afterwards.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`LED_*`)
//! 3. TOML configuration file (`/etc/halo/halo.toml` by default)
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [device]
//! pixel_count = 10
//! gpio_pin = 18
//! brightness = 0.6
//! dma_channel = 5
//! max_fps = 20
//! spi_device = "/dev/spidev0.0"
//! output = "ws281x"
//!
//! [control]
//! socket_path = "/tmp/halo_led.sock"
//! auto_off_secs = 300
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System-wide configuration file, read only when present
pub const DEFAULT_CONFIG_PATH: &str = "/etc/halo/halo.toml";

/// Control socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/halo_led.sock";

/// Transfer channel audio output commonly claims
pub const CONFLICTING_DMA_CHANNEL: u8 = 10;

/// Highest transfer channel the peripheral exposes
pub const MAX_DMA_CHANNEL: u8 = 14;

/// Largest strip the daemon will drive
pub const MAX_PIXELS: usize = 1024;

/// Pins wired to a PWM, PCM or SPI output
pub const SUPPORTED_PINS: [u8; 4] = [10, 12, 18, 21];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Environment variable holds an unparsable value
    #[error("Invalid value '{value}' in environment variable {var}")]
    EnvError {
        /// Variable name
        var: &'static str,
        /// Raw value found
        value: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the highest-priority configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Output Backend Selection
// =============================================================================

/// Which peripheral backend renders frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// PWM/PCM output pinned to `dma_channel`, spidev as fallback
    #[default]
    Ws281x,
    /// WS2812 strip on a Linux spidev device, never channel-isolated
    Spi,
    /// In-memory sink, no hardware and no privileges needed
    Simulated,
}

impl OutputKind {
    /// Name used in config files and on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws281x => "ws281x",
            Self::Spi => "spi",
            Self::Simulated => "simulated",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ws281x" | "pwm" => Ok(Self::Ws281x),
            "spi" => Ok(Self::Spi),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!(
                "unknown output '{other}' (expected ws281x, spi or simulated)"
            )),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Device section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceToml {
    /// Number of pixels on the strip
    pub pixel_count: Option<usize>,

    /// Data pin (BCM numbering)
    pub gpio_pin: Option<u8>,

    /// Global brightness scalar, 0.0 - 1.0
    pub brightness: Option<f32>,

    /// Requested transfer channel
    pub dma_channel: Option<u8>,

    /// Frame rate ceiling
    pub max_fps: Option<u32>,

    /// spidev node used by the spi backend
    pub spi_device: Option<PathBuf>,

    /// Output backend
    pub output: Option<OutputKind>,
}

/// Control section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlToml {
    /// Control socket path
    pub socket_path: Option<PathBuf>,

    /// Seconds a lit mood may be held before the daemon turns off (0 = never)
    pub auto_off_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloToml {
    /// Device configuration section
    pub device: DeviceToml,

    /// Control channel configuration section
    pub control: ControlToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Hardware settings, immutable after startup
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// Number of pixels on the strip
    pub pixel_count: usize,
    /// Data pin (BCM numbering)
    pub gpio_pin: u8,
    /// Global brightness scalar
    pub brightness: f32,
    /// Requested transfer channel
    pub dma_channel: u8,
    /// Frame rate ceiling
    pub max_fps: u32,
    /// spidev node used by the spi backend
    pub spi_device: PathBuf,
    /// Output backend
    pub output: OutputKind,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pixel_count: 10,
            gpio_pin: 18,
            brightness: 0.6,
            dma_channel: 5,
            max_fps: 20,
            spi_device: PathBuf::from("/dev/spidev0.0"),
            output: OutputKind::Ws281x,
        }
    }
}

impl DeviceConfig {
    /// Check every invariant the driver and engine rely on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pixel_count == 0 || self.pixel_count > MAX_PIXELS {
            return Err(ConfigError::ValidationError(format!(
                "pixel_count must be between 1 and {MAX_PIXELS}, got {}",
                self.pixel_count
            )));
        }
        if !(0.0..=1.0).contains(&self.brightness) {
            return Err(ConfigError::ValidationError(format!(
                "brightness must be between 0.0 and 1.0, got {}",
                self.brightness
            )));
        }
        if self.max_fps == 0 {
            return Err(ConfigError::ValidationError(
                "max_fps must be greater than 0".to_string(),
            ));
        }
        if self.dma_channel > MAX_DMA_CHANNEL {
            return Err(ConfigError::ValidationError(format!(
                "dma_channel must be at most {MAX_DMA_CHANNEL}, got {}",
                self.dma_channel
            )));
        }
        if !SUPPORTED_PINS.contains(&self.gpio_pin) {
            return Err(ConfigError::ValidationError(format!(
                "gpio_pin {} cannot drive a strip (supported: {SUPPORTED_PINS:?})",
                self.gpio_pin
            )));
        }
        Ok(())
    }

    /// True when the requested channel is the one audio usually claims
    #[must_use]
    pub fn uses_conflicting_channel(&self) -> bool {
        self.dma_channel == CONFLICTING_DMA_CHANNEL
    }
}

/// Full daemon configuration
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Hardware settings
    pub device: DeviceConfig,

    /// Control socket path
    pub socket_path: PathBuf,

    /// Idle timeout for lit moods, `None` when disabled
    pub auto_off: Option<Duration>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            auto_off: Some(Duration::from_secs(300)),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl DaemonConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the device section
    #[must_use]
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    /// Replace the control socket path
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Replace the idle timeout, `None` to disable
    #[must_use]
    pub fn with_auto_off(mut self, auto_off: Option<Duration>) -> Self {
        self.auto_off = auto_off;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Validate the device section
    ///
    /// # Errors
    ///
    /// See [`DeviceConfig::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Load configuration from the default file (if present) and the environment
///
/// # Errors
///
/// Returns an error if the default file exists but cannot be read or parsed,
/// or if an `LED_*` variable is unparsable.
pub fn load_config() -> Result<DaemonConfig, ConfigError> {
    load_with(Path::new(DEFAULT_CONFIG_PATH), false, &env_lookup)
}

/// Load configuration from an explicitly named file plus the environment
///
/// # Errors
///
/// Unlike [`load_config`], a missing file is an error here.
pub fn load_config_from_path(path: &Path) -> Result<DaemonConfig, ConfigError> {
    load_with(path, true, &env_lookup)
}

/// Load, apply CLI overrides and validate
///
/// `path` names an explicit config file; `None` falls back to the optional
/// default file.
///
/// # Errors
///
/// Any loading error, or [`ConfigError::ValidationError`] for out-of-range
/// values after all layers are merged.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<DaemonConfig, ConfigError> {
    let mut config = match path {
        Some(p) => load_config_from_path(p)?,
        None => load_config()?,
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn load_with(
    path: &Path,
    required: bool,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<DaemonConfig, ConfigError> {
    let mut config = DaemonConfig::default();

    if path.exists() {
        let toml_content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let toml_config: HaloToml = toml::from_str(&toml_content)?;
        apply_toml_config(&mut config, &toml_config);
        config.config_file_path = Some(path.to_path_buf());
        config.source = ConfigSource::File;

        tracing::info!(path = %path.display(), "Loaded configuration from file");
    } else if required {
        return Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        });
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut DaemonConfig, toml: &HaloToml) {
    let device = &toml.device;
    if let Some(n) = device.pixel_count {
        config.device.pixel_count = n;
    }
    if let Some(pin) = device.gpio_pin {
        config.device.gpio_pin = pin;
    }
    if let Some(b) = device.brightness {
        config.device.brightness = b;
    }
    if let Some(ch) = device.dma_channel {
        config.device.dma_channel = ch;
    }
    if let Some(fps) = device.max_fps {
        config.device.max_fps = fps;
    }
    if let Some(ref dev) = device.spi_device {
        config.device.spi_device = dev.clone();
    }
    if let Some(output) = device.output {
        config.device.output = output;
    }

    if let Some(ref path) = toml.control.socket_path {
        config.socket_path = path.clone();
    }
    if let Some(secs) = toml.control.auto_off_secs {
        config.auto_off = auto_off_from_secs(secs);
    }
}

fn auto_off_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn env_value<T: FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::EnvError { var, value: raw }),
    }
}

/// Apply `LED_*` environment overrides
fn apply_env_config(
    config: &mut DaemonConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let before = config.clone();

    if let Some(n) = env_value(env, "LED_COUNT")? {
        config.device.pixel_count = n;
    }
    if let Some(b) = env_value(env, "LED_BRIGHTNESS")? {
        config.device.brightness = b;
    }
    if let Some(pin) = env_value(env, "LED_GPIO_PIN")? {
        config.device.gpio_pin = pin;
    }
    if let Some(ch) = env_value(env, "LED_DMA_CHANNEL")? {
        config.device.dma_channel = ch;
    }
    if let Some(fps) = env_value(env, "LED_MAX_FPS")? {
        config.device.max_fps = fps;
    }
    if let Some(dev) = env_value::<PathBuf>(env, "LED_SPI_DEVICE")? {
        config.device.spi_device = dev;
    }
    if let Some(output) = env_value(env, "LED_OUTPUT")? {
        config.device.output = output;
    }
    if let Some(path) = env_value::<PathBuf>(env, "LED_SOCKET")? {
        config.socket_path = path;
    }
    if let Some(secs) = env_value::<u64>(env, "LED_AUTO_OFF_TIMEOUT")? {
        config.auto_off = auto_off_from_secs(secs);
    }

    if config.device != before.device
        || config.socket_path != before.socket_path
        || config.auto_off != before.auto_off
    {
        config.source = ConfigSource::Env;
    }
    Ok(())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line, applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Override control socket path
    pub socket_path: Option<PathBuf>,

    /// Override output backend
    pub output: Option<OutputKind>,

    /// Override pixel count
    pub pixel_count: Option<usize>,
}

impl ConfigOverrides {
    /// Create empty overrides (no changes)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set output backend override
    #[must_use]
    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = Some(output);
        self
    }

    /// Set pixel count override
    #[must_use]
    pub fn with_pixel_count(mut self, n: usize) -> Self {
        self.pixel_count = Some(n);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut DaemonConfig) {
        let mut changed = false;
        if let Some(ref path) = self.socket_path {
            config.socket_path = path.clone();
            changed = true;
        }
        if let Some(output) = self.output {
            config.device.output = output;
            changed = true;
        }
        if let Some(n) = self.pixel_count {
            config.device.pixel_count = n;
            changed = true;
        }
        if changed {
            config.source = ConfigSource::Cli;
        }
    }
}
