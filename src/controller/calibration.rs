//! # Calibration Module
//!
//! Turns a normalized joystick axis into a channel value in microseconds.
//!
//! ## Deadzone
//!
//! Values within the deadzone are mapped to center (0.0), while values
//! outside are rescaled so full deflection still reaches the endpoints.
//!
//! ## Exponential Curves
//!
//! The optional expo curve softens the response around center:
//! `output = (1 - expo) * input + expo * input³`.
//! With `expo = 0.0` (the default) the response is linear.
//!
//! ## Scaling
//!
//! The calibrated value maps linearly to `1500 + value * 500` µs, clamped
//! to 1000..=2000.
//!
//! ```
//! use crsf_bridge::controller::calibration::Calibration;
//!
//! let cal = Calibration::new(0.05, 0.0);
//! assert_eq!(cal.to_us(0.02), 1500);
//! assert_eq!(cal.to_us(1.0), 2000);
//! assert_eq!(cal.to_us(-1.0), 1000);
//! ```

use crate::crsf::protocol::{CHANNEL_US_CENTER, CHANNEL_US_MAX, CHANNEL_US_MIN};

/// Half the microsecond span; full deflection moves the channel this far from center
const US_HALF_RANGE: f32 = 500.0;

/// Deadzone and expo applied to a normalized input in -1.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Deadzone as a fraction (0.0 to 0.5).
    deadzone: f32,
    /// Exponential curve factor (0.0 to 1.0).
    expo: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            expo: 0.0,
        }
    }
}

impl Calibration {
    /// Creates a calibration; out-of-range arguments are clamped
    #[must_use]
    pub fn new(deadzone: f32, expo: f32) -> Self {
        Self {
            deadzone: deadzone.clamp(0.0, 0.5),
            expo: expo.clamp(0.0, 1.0),
        }
    }

    /// No deadzone, no expo.
    #[must_use]
    pub fn linear() -> Self {
        Self {
            deadzone: 0.0,
            expo: 0.0,
        }
    }

    #[must_use]
    pub fn deadzone(&self) -> f32 {
        self.deadzone
    }

    #[must_use]
    pub fn expo(&self) -> f32 {
        self.expo
    }

    /// Applies deadzone and expo curve to a normalized input.
    ///
    /// Inputs outside -1.0..=1.0 are clamped first.
    #[must_use]
    pub fn apply(&self, input: f32) -> f32 {
        if input.is_nan() {
            return 0.0;
        }
        let input = input.clamp(-1.0, 1.0);
        let sign = input.signum();
        let after_deadzone = self.apply_deadzone(input.abs());
        sign * self.apply_expo(after_deadzone)
    }

    /// Calibrates and scales to microseconds
    #[must_use]
    pub fn to_us(&self, input: f32) -> u16 {
        let value = self.apply(input);
        if value == 0.0 {
            return CHANNEL_US_CENTER;
        }
        let us = f32::from(CHANNEL_US_CENTER) + value * US_HALF_RANGE;
        us.round()
            .clamp(f32::from(CHANNEL_US_MIN), f32::from(CHANNEL_US_MAX)) as u16
    }

    #[inline]
    fn apply_deadzone(&self, abs_input: f32) -> f32 {
        if abs_input <= self.deadzone {
            0.0
        } else {
            (abs_input - self.deadzone) / (1.0 - self.deadzone)
        }
    }

    #[inline]
    fn apply_expo(&self, input: f32) -> f32 {
        if self.expo == 0.0 {
            input
        } else {
            (1.0 - self.expo) * input + self.expo * input * input * input
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let cal = Calibration::default();
        assert_eq!(cal.deadzone(), 0.05);
        assert_eq!(cal.expo(), 0.0);
    }

    #[test]
    fn test_new_clamps_values() {
        let cal = Calibration::new(0.9, 1.5);
        assert_eq!(cal.deadzone(), 0.5);
        assert_eq!(cal.expo(), 1.0);

        let cal = Calibration::new(-0.1, -0.5);
        assert_eq!(cal.deadzone(), 0.0);
        assert_eq!(cal.expo(), 0.0);
    }

    #[test]
    fn test_deadzone_maps_to_center() {
        let cal = Calibration::new(0.1, 0.0);
        assert_eq!(cal.apply(0.05), 0.0);
        assert_eq!(cal.apply(-0.1), 0.0);
        assert_eq!(cal.to_us(0.09), 1500);
    }

    #[test]
    fn test_deadzone_rescales_remaining_range() {
        let cal = Calibration::new(0.1, 0.0);
        assert!((cal.apply(0.55) - 0.5).abs() < 1e-6);
        assert!((cal.apply(1.0) - 1.0).abs() < 1e-6);
        assert!((cal.apply(-1.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_scaling_to_us() {
        let cal = Calibration::linear();
        assert_eq!(cal.to_us(0.0), 1500);
        assert_eq!(cal.to_us(0.5), 1750);
        assert_eq!(cal.to_us(-0.5), 1250);
        assert_eq!(cal.to_us(1.0), 2000);
        assert_eq!(cal.to_us(-1.0), 1000);
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let cal = Calibration::linear();
        assert_eq!(cal.to_us(3.0), 2000);
        assert_eq!(cal.to_us(-3.0), 1000);
        assert_eq!(cal.to_us(f32::NAN), 1500);
    }

    #[test]
    fn test_expo_softens_center_keeps_endpoints() {
        let cal = Calibration::new(0.0, 0.5);
        assert!(cal.apply(0.5) < 0.5);
        assert!((cal.apply(1.0) - 1.0).abs() < 1e-6);
        assert!((cal.apply(-1.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_monotonic() {
        let cal = Calibration::new(0.05, 0.3);
        let mut last = cal.to_us(-1.0);
        for i in -100..=100 {
            let us = cal.to_us(i as f32 / 100.0);
            assert!(us >= last, "not monotonic at {}", i);
            last = us;
        }
    }
}
