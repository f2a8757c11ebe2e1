//! WS2812 output through the rpi_ws281x PWM/PCM engine
//!
//! The library streams pixel data from memory with a DMA channel and data
//! pin chosen by the caller, so an exclusive acquisition here really runs on
//! the configured channel. That channel is what status and the startup log
//! report.
//!
//! Shared acquisition falls back to spidev, which leaves channel assignment
//! to the kernel. Builds without the `ws281x` feature refuse exclusive
//! acquisition outright and always take the fallback.

use super::{DriverError, Peripheral, PixelSink, SpiPeripheral};
use crate::config::DeviceConfig;

/// Strip driven by the Raspberry Pi PWM/PCM peripheral
#[derive(Clone, Debug)]
pub struct Ws281xPeripheral {
    pixel_count: usize,
    gpio_pin: u8,
    fallback: SpiPeripheral,
}

impl Ws281xPeripheral {
    /// Peripheral described by the device settings
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            pixel_count: config.pixel_count,
            gpio_pin: config.gpio_pin,
            fallback: SpiPeripheral::from_config(config),
        }
    }
}

impl Peripheral for Ws281xPeripheral {
    fn name(&self) -> &'static str {
        "ws281x"
    }

    fn acquire_exclusive(&self, channel: u8) -> Result<Box<dyn PixelSink>, DriverError> {
        engine::open(self.pixel_count, self.gpio_pin, channel)
    }

    fn acquire_shared(&self) -> Result<Box<dyn PixelSink>, DriverError> {
        self.fallback.acquire_shared()
    }
}

#[cfg(feature = "ws281x")]
mod engine {
    use rs_ws281x::{ChannelBuilder, Controller, ControllerBuilder, RawColor, StripType};

    use super::super::{DriverError, PixelSink};
    use crate::animation::Rgb;

    /// WS2812 bit clock
    const STRIP_HZ: u32 = 800_000;

    pub(super) fn open(
        pixel_count: usize,
        gpio_pin: u8,
        channel: u8,
    ) -> Result<Box<dyn PixelSink>, DriverError> {
        let count = i32::try_from(pixel_count)
            .map_err(|_| DriverError::acquisition("exclusive", "pixel count out of range"))?;

        // Brightness is applied by the animation engine, not the library
        let controller = ControllerBuilder::new()
            .freq(STRIP_HZ)
            .dma(i32::from(channel))
            .channel(
                0,
                ChannelBuilder::new()
                    .pin(i32::from(gpio_pin))
                    .count(count)
                    .strip_type(StripType::Ws2811Grb)
                    .brightness(255)
                    .build(),
            )
            .build()
            .map_err(|e| {
                DriverError::acquisition(
                    "exclusive",
                    format!("ws281x on GPIO {gpio_pin}, channel {channel}: {e}"),
                )
            })?;

        Ok(Box::new(ControllerSink {
            controller: Some(controller),
        }))
    }

    /// Library color layout: blue, green, red, white
    pub(super) fn raw_color(px: Rgb) -> RawColor {
        [px.b, px.g, px.r, 0]
    }

    struct ControllerSink {
        controller: Option<Controller>,
    }

    // SAFETY: the controller is created on the startup thread and then used
    // only by the ticking thread that owns the sink; it is never shared.
    unsafe impl Send for ControllerSink {}

    impl PixelSink for ControllerSink {
        fn write(&mut self, pixels: &[Rgb]) -> std::io::Result<()> {
            let controller = self.controller.as_mut().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "controller released")
            })?;
            for (led, px) in controller.leds_mut(0).iter_mut().zip(pixels) {
                *led = raw_color(*px);
            }
            controller
                .render()
                .map_err(|e| std::io::Error::other(e.to_string()))
        }

        fn close(&mut self) {
            // Dropping the controller stops DMA and frees the channel
            drop(self.controller.take());
        }
    }

}

#[cfg(not(feature = "ws281x"))]
mod engine {
    use super::super::{DriverError, PixelSink};

    pub(super) fn open(
        _pixel_count: usize,
        gpio_pin: u8,
        channel: u8,
    ) -> Result<Box<dyn PixelSink>, DriverError> {
        Err(DriverError::acquisition(
            "exclusive",
            format!(
                "built without ws281x support; cannot pin channel {channel} on GPIO {gpio_pin}"
            ),
        ))
    }
}
