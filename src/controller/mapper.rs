//! # Joystick Event Mapper
//!
//! Folds raw evdev events into normalized stick positions.
//!
//! ## Axis Codes (EV_ABS)
//!
//! | Axis | evdev Code | Function |
//! |------|------------|----------|
//! | 0 | ABS_X | Yaw |
//! | 1 | ABS_Y | Throttle (up is negative) |
//! | 2 | ABS_Z | Roll |
//! | 3 | ABS_RZ | Pitch (up is negative) |
//!
//! Raw values are normalized to -1.0..=1.0 using each axis' reported
//! minimum and maximum. Other events are ignored.

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind};

/// Axis codes in joystick axis order
pub const STICK_AXES: [AbsoluteAxisType; 4] = [
    AbsoluteAxisType::ABS_X,
    AbsoluteAxisType::ABS_Y,
    AbsoluteAxisType::ABS_Z,
    AbsoluteAxisType::ABS_RZ,
];

/// Raw range reported by the device for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

impl Default for AxisRange {
    /// 8-bit gamepad range, used when the device reports nothing usable
    fn default() -> Self {
        Self { min: 0, max: 255 }
    }
}

impl AxisRange {
    pub fn new(min: i32, max: i32) -> Self {
        if max > min {
            Self { min, max }
        } else {
            Self::default()
        }
    }

    /// Maps a raw value to -1.0..=1.0
    pub fn normalize(&self, raw: i32) -> f32 {
        let span = (self.max - self.min) as f32;
        let position = (raw.clamp(self.min, self.max) - self.min) as f32 / span;
        position * 2.0 - 1.0
    }
}

/// Normalized stick positions, raw device orientation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JoystickAxes {
    /// Axis 0 (ABS_X)
    pub yaw: f32,
    /// Axis 1 (ABS_Y)
    pub throttle: f32,
    /// Axis 2 (ABS_Z)
    pub roll: f32,
    /// Axis 3 (ABS_RZ)
    pub pitch: f32,
}

/// Accumulates events into [`JoystickAxes`]
///
/// Not thread-safe; owned by the reader thread.
#[derive(Debug)]
pub struct EventMapper {
    ranges: [AxisRange; 4],
    axes: JoystickAxes,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self::new([AxisRange::default(); 4])
    }
}

impl EventMapper {
    /// Creates a mapper with one range per entry of [`STICK_AXES`]
    #[must_use]
    pub fn new(ranges: [AxisRange; 4]) -> Self {
        Self {
            ranges,
            axes: JoystickAxes::default(),
        }
    }

    #[must_use]
    pub fn axes(&self) -> JoystickAxes {
        self.axes
    }

    /// Processes one event; returns true if a stick position changed
    pub fn process_event(&mut self, event: &InputEvent) -> bool {
        match event.kind() {
            InputEventKind::AbsAxis(axis) => self.process_axis(axis, event.value()),
            _ => false,
        }
    }

    /// Processes one absolute axis value
    pub fn process_axis(&mut self, axis: AbsoluteAxisType, raw: i32) -> bool {
        let Some(index) = STICK_AXES.iter().position(|a| *a == axis) else {
            return false;
        };

        let value = self.ranges[index].normalize(raw);
        let slot = match index {
            0 => &mut self.axes.yaw,
            1 => &mut self.axes.throttle,
            2 => &mut self.axes.roll,
            _ => &mut self.axes.pitch,
        };

        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    #[test]
    fn test_normalize_8bit() {
        let range = AxisRange::default();
        assert_eq!(range.normalize(0), -1.0);
        assert_eq!(range.normalize(255), 1.0);
        assert!(range.normalize(128).abs() < 0.01);
    }

    #[test]
    fn test_normalize_16bit_signed() {
        let range = AxisRange::new(-32768, 32767);
        assert_eq!(range.normalize(-32768), -1.0);
        assert_eq!(range.normalize(32767), 1.0);
        assert!(range.normalize(0).abs() < 0.001);
        // out of range values are clamped
        assert_eq!(range.normalize(40000), 1.0);
    }

    #[test]
    fn test_degenerate_range_falls_back() {
        assert_eq!(AxisRange::new(5, 5), AxisRange::default());
    }

    #[test]
    fn test_axes_mapped_in_order() {
        let mut mapper = EventMapper::default();
        assert!(mapper.process_axis(AbsoluteAxisType::ABS_X, 255));
        assert!(mapper.process_axis(AbsoluteAxisType::ABS_Y, 0));
        assert!(mapper.process_axis(AbsoluteAxisType::ABS_Z, 0));
        assert!(mapper.process_axis(AbsoluteAxisType::ABS_RZ, 255));

        let axes = mapper.axes();
        assert_eq!(axes.yaw, 1.0);
        assert_eq!(axes.throttle, -1.0);
        assert_eq!(axes.roll, -1.0);
        assert_eq!(axes.pitch, 1.0);
    }

    #[test]
    fn test_unchanged_value_reports_no_change() {
        let mut mapper = EventMapper::default();
        assert!(mapper.process_axis(AbsoluteAxisType::ABS_X, 200));
        assert!(!mapper.process_axis(AbsoluteAxisType::ABS_X, 200));
    }

    #[test]
    fn test_other_events_ignored() {
        let mut mapper = EventMapper::default();
        let trigger = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_RX.0, 255);
        let sync = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        assert!(!mapper.process_event(&trigger));
        assert!(!mapper.process_event(&sync));
        assert_eq!(mapper.axes(), JoystickAxes::default());

        let stick = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_Z.0, 0);
        assert!(mapper.process_event(&stick));
        assert_eq!(mapper.axes().roll, -1.0);
    }
}
