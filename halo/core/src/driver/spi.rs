//! WS2812 output over Linux spidev
//!
//! Each LED bit is stretched to three SPI bits at 2.4 MHz (`1 → 110`,
//! `0 → 100`), giving the 1.25 µs bit period the strip expects. Bytes go
//! out in GRB order, followed by a run of zero bytes that latches the frame.
//!
//! The SPI controller's DMA channel is assigned by the kernel, so this
//! backend can only be acquired shared. Channel isolation needs the
//! [`Ws281xPeripheral`](super::Ws281xPeripheral), which uses spidev as its
//! fallback.
//!
//! The kernel caps a single spidev write at `spidev.bufsiz` (4096 bytes by
//! default), which limits one-shot frames to roughly 440 pixels unless the
//! module parameter is raised.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use super::{DriverError, Peripheral, PixelSink};
use crate::animation::Rgb;
use crate::config::DeviceConfig;

/// SPI clock giving three SPI bits per WS2812 bit
pub const SPI_HZ: u32 = 2_400_000;

/// Zero bytes appended after each frame (~320 µs low at 2.4 MHz)
pub const LATCH_BYTES: usize = 96;

const ONE_PATTERN: u32 = 0b110;
const ZERO_PATTERN: u32 = 0b100;

nix::ioctl_write_ptr!(
    /// `SPI_IOC_WR_MAX_SPEED_HZ`
    spi_write_max_speed_hz,
    b'k',
    4,
    u32
);

/// Encode one frame as a spidev byte stream
#[must_use]
pub fn encode_frame(pixels: &[Rgb]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 9 + LATCH_BYTES);
    for px in pixels {
        for byte in [px.g, px.r, px.b] {
            encode_byte(byte, &mut out);
        }
    }
    out.resize(out.len() + LATCH_BYTES, 0);
    out
}

fn encode_byte(byte: u8, out: &mut Vec<u8>) {
    let mut bits: u32 = 0;
    for i in (0..8).rev() {
        let pattern = if (byte >> i) & 1 == 1 {
            ONE_PATTERN
        } else {
            ZERO_PATTERN
        };
        bits = (bits << 3) | pattern;
    }
    // 24 significant bits, most significant first
    out.extend_from_slice(&bits.to_be_bytes()[1..]);
}

/// LED strip wired to an SPI MOSI line
#[derive(Clone, Debug)]
pub struct SpiPeripheral {
    device: PathBuf,
}

impl SpiPeripheral {
    /// Peripheral on the given spidev node
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Peripheral described by the device settings
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.spi_device.clone())
    }

    fn open_device(&self) -> Result<File, DriverError> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.device)
            .map_err(|e| {
                DriverError::acquisition("shared", format!("{}: {e}", self.device.display()))
            })?;

        // SAFETY: the fd is open for the duration of the call and the
        // pointer refers to a live u32.
        unsafe { spi_write_max_speed_hz(file.as_raw_fd(), &SPI_HZ) }.map_err(|e| {
            let device = self.device.display();
            DriverError::acquisition("shared", format!("set SPI speed on {device}: {e}"))
        })?;

        Ok(file)
    }
}

impl Peripheral for SpiPeripheral {
    fn name(&self) -> &'static str {
        "spi"
    }

    fn acquire_exclusive(&self, channel: u8) -> Result<Box<dyn PixelSink>, DriverError> {
        Err(DriverError::acquisition(
            "exclusive",
            format!(
                "{} cannot pin transfer channel {channel}; use output = \"ws281x\"",
                self.device.display()
            ),
        ))
    }

    fn acquire_shared(&self) -> Result<Box<dyn PixelSink>, DriverError> {
        let device = self.open_device()?;
        Ok(Box::new(SpiSink {
            device: Some(device),
        }))
    }
}

struct SpiSink {
    device: Option<File>,
}

impl PixelSink for SpiSink {
    fn write(&mut self, pixels: &[Rgb]) -> std::io::Result<()> {
        let device = self.device.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "device closed")
        })?;
        device.write_all(&encode_frame(pixels))
    }

    fn close(&mut self) {
        drop(self.device.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverMode, OutputDriver};
    use tempfile::TempDir;

    #[test]
    fn test_encode_byte_patterns() {
        let mut out = Vec::new();
        encode_byte(0xFF, &mut out);
        assert_eq!(out, vec![0xDB, 0x6D, 0xB6]);

        out.clear();
        encode_byte(0x00, &mut out);
        assert_eq!(out, vec![0x92, 0x49, 0x24]);
    }

    #[test]
    fn test_encode_frame_grb_order_and_latch() {
        let frame = encode_frame(&[Rgb { r: 0, g: 0xFF, b: 0 }]);
        assert_eq!(frame.len(), 9 + LATCH_BYTES);
        // green first
        assert_eq!(&frame[0..3], &[0xDB, 0x6D, 0xB6]);
        assert_eq!(&frame[3..6], &[0x92, 0x49, 0x24]);
        assert_eq!(&frame[6..9], &[0x92, 0x49, 0x24]);
        assert!(frame[9..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_exclusive_never_granted() {
        let spi = SpiPeripheral::new("/dev/spidev0.0");
        match spi.acquire_exclusive(5) {
            Err(DriverError::AcquisitionFailed { path, reason }) => {
                assert_eq!(path, "exclusive");
                assert!(reason.contains("cannot pin transfer channel 5"));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("spidev must not claim an isolated channel"),
        }
    }

    #[test]
    fn test_missing_device_fails_shared() {
        let dir = TempDir::new().unwrap();
        let spi = SpiPeripheral::new(dir.path().join("spidev9.9"));
        assert!(matches!(
            spi.acquire_shared(),
            Err(DriverError::AcquisitionFailed { path: "shared", .. })
        ));
    }

    #[test]
    fn test_degrades_to_detached_without_device() {
        let dir = TempDir::new().unwrap();
        let spi = SpiPeripheral::new(dir.path().join("spidev9.9"));
        let mut driver = OutputDriver::new(&DeviceConfig::default());
        let acq = driver.initialize(&spi).unwrap();
        assert_eq!(acq.mode, DriverMode::Detached);
        assert!(!acq.exclusive());
    }
}
