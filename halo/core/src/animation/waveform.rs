//! Waveform Math
//!
//! Pure functions of elapsed time. Every function restarts at phase zero
//! when `elapsed` is a whole multiple of the period.

use std::time::Duration;

/// Position within the current cycle, in `[0.0, 1.0)`
///
/// A zero period is treated as a frozen waveform (phase 0).
#[must_use]
pub fn phase(elapsed: Duration, period: Duration) -> f64 {
    let period_ns = period.as_nanos();
    if period_ns == 0 {
        return 0.0;
    }
    (elapsed.as_nanos() % period_ns) as f64 / period_ns as f64
}

/// Triangular breathing level between `min` and `max`
///
/// Starts at `min`, peaks at `max` half way through the period and returns
/// to `min` at the end of the period.
#[must_use]
pub fn breathe_level(min: f32, max: f32, period: Duration, elapsed: Duration) -> f32 {
    let phase = phase(elapsed, period);
    let rise = 1.0 - (2.0 * phase - 1.0).abs();
    let level = f64::from(min) + f64::from(max - min) * rise;
    (level as f32).clamp(min, max)
}

/// Index of the spinning head pixel
///
/// `floor(pixel_count * (elapsed mod period) / period)`, computed in integer
/// nanoseconds so the result is exact.
#[must_use]
pub fn spin_head(pixel_count: usize, period: Duration, elapsed: Duration) -> usize {
    let period_ns = period.as_nanos();
    if pixel_count == 0 || period_ns == 0 {
        return 0;
    }
    let offset = elapsed.as_nanos() % period_ns;
    let head = (pixel_count as u128 * offset) / period_ns;
    // offset < period, so head < pixel_count
    head as usize
}

/// Brightness of a pixel `distance` steps behind the head
///
/// The head itself is distance 0 and gets `max`. Pixels at or beyond
/// `trail` are dark.
#[must_use]
pub fn trail_level(max: f32, trail: usize, distance: usize) -> f32 {
    if trail == 0 || distance >= trail {
        return 0.0;
    }
    max * (1.0 - distance as f32 / trail as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(2000);

    #[test]
    fn test_phase_wraps() {
        assert!(phase(Duration::ZERO, PERIOD).abs() < f64::EPSILON);
        assert!(phase(PERIOD, PERIOD).abs() < f64::EPSILON);
        assert!((phase(Duration::from_millis(500), PERIOD) - 0.25).abs() < 1e-9);
        assert!((phase(Duration::from_millis(2500), PERIOD) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_phase_zero_period() {
        assert!(phase(Duration::from_secs(3), Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn test_breathe_is_periodic() {
        let at_zero = breathe_level(0.1, 0.4, PERIOD, Duration::ZERO);
        let at_period = breathe_level(0.1, 0.4, PERIOD, PERIOD);
        let at_three = breathe_level(0.1, 0.4, PERIOD, PERIOD * 3);
        assert!((at_zero - at_period).abs() < f32::EPSILON);
        assert!((at_zero - at_three).abs() < f32::EPSILON);
        assert!((at_zero - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_breathe_peaks_half_way() {
        let peak = breathe_level(0.1, 0.4, PERIOD, PERIOD / 2);
        assert!((peak - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_breathe_stays_in_range() {
        for ms in (0..10_000).step_by(7) {
            let level = breathe_level(0.2, 0.6, PERIOD, Duration::from_millis(ms));
            assert!((0.2..=0.6).contains(&level), "level {level} at {ms}ms");
        }
    }

    #[test]
    fn test_spin_head_half_period() {
        let period = Duration::from_millis(500);
        for n in [2, 4, 10, 16, 60] {
            assert_eq!(spin_head(n, period, period / 2), n / 2);
        }
    }

    #[test]
    fn test_spin_head_bounds() {
        let period = Duration::from_millis(500);
        assert_eq!(spin_head(10, period, Duration::ZERO), 0);
        assert_eq!(spin_head(10, period, Duration::from_millis(499)), 9);
        assert_eq!(spin_head(10, period, period), 0);
        assert_eq!(spin_head(0, period, Duration::from_millis(100)), 0);
    }

    #[test]
    fn test_trail_decays() {
        assert!((trail_level(0.9, 3, 0) - 0.9).abs() < f32::EPSILON);
        assert!((trail_level(0.9, 3, 1) - 0.6).abs() < 1e-6);
        assert!((trail_level(0.9, 3, 2) - 0.3).abs() < 1e-6);
        assert!(trail_level(0.9, 3, 3).abs() < f32::EPSILON);
        assert!(trail_level(0.9, 0, 0).abs() < f32::EPSILON);
    }
}
