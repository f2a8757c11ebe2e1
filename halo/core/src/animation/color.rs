//! Hue/brightness to RGB conversion
//!
//! The only path from a normalized level to a pixel value. Moods never build
//! colors themselves, so a given `(hue, level)` pair always yields the same
//! triple.

use smart_leds::hsv::{hsv2rgb, Hsv};
use smart_leds::RGB8;

/// One pixel as sent to the strip
pub type Rgb = RGB8;

/// A dark pixel
pub const BLACK: Rgb = RGB8 { r: 0, g: 0, b: 0 };

/// Clamp a level to `[0, scalar]` after applying the global brightness scalar
#[must_use]
pub fn scaled_level(level: f32, scalar: f32) -> f32 {
    let scalar = scalar.clamp(0.0, 1.0);
    let level = if level.is_nan() { 0.0 } else { level };
    (level.clamp(0.0, 1.0) * scalar).clamp(0.0, scalar)
}

/// Convert a hue and normalized level to a pixel at full saturation
#[must_use]
pub fn pixel(hue: u8, level: f32, scalar: f32) -> Rgb {
    let val = (scaled_level(level, scalar) * 255.0).round() as u8;
    hsv2rgb(Hsv { hue, sat: 255, val })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::BLUE_HUE;

    #[test]
    fn test_blue_hue_is_pure_blue() {
        let px = pixel(BLUE_HUE, 1.0, 1.0);
        assert_eq!(px, RGB8 { r: 0, g: 0, b: 255 });
    }

    #[test]
    fn test_zero_level_is_black() {
        for hue in [0u8, 64, 128, BLUE_HUE, 255] {
            assert_eq!(pixel(hue, 0.0, 0.6), BLACK);
        }
    }

    #[test]
    fn test_scalar_caps_level() {
        assert!((scaled_level(1.0, 0.6) - 0.6).abs() < f32::EPSILON);
        assert!((scaled_level(2.0, 0.6) - 0.6).abs() < f32::EPSILON);
        assert!(scaled_level(-1.0, 0.6).abs() < f32::EPSILON);
        assert!(scaled_level(f32::NAN, 0.6).abs() < f32::EPSILON);
        assert_eq!(pixel(BLUE_HUE, 1.0, 0.6).b, 153);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let a = pixel(BLUE_HUE, 0.37, 0.8);
        let b = pixel(BLUE_HUE, 0.37, 0.8);
        assert_eq!(a, b);
    }
}
