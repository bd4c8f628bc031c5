//! # RC Channel Mapper Module
//!
//! Maps normalized joystick axes onto the stick channels.
//!
//! ## Channel Assignments
//!
//! | Channel | Axis | Function |
//! |---------|------|----------|
//! | CH1 | 2 (ABS_Z) | Roll |
//! | CH2 | 3 (ABS_RZ), inverted | Pitch |
//! | CH3 | 1 (ABS_Y), inverted | Throttle |
//! | CH4 | 0 (ABS_X) | Yaw |
//!
//! Stick Y axes report "up" as negative, hence the default inversion.
//!
//! Throttle follows `channels.throttle_channel`, the channel fail-safe
//! forces. When that is one of the other stick channels, the stick normally
//! on it moves to CH3. Channels 5-16 are only touched when one of them is
//! the throttle channel.

use super::calibration::Calibration;
use super::mapper::JoystickAxes;
use crate::config::Config;
use crate::control::state::SharedState;

/// Channel indices (1-based) for semantic access.
pub mod channels {
    pub const ROLL: usize = 1;
    pub const PITCH: usize = 2;
    pub const THROTTLE: usize = 3;
    pub const YAW: usize = 4;
}

/// Converts [`JoystickAxes`] into channel updates
#[derive(Debug, Clone)]
pub struct ChannelMapper {
    calibration: Calibration,
    invert_throttle: bool,
    invert_pitch: bool,
    throttle_channel: usize,
}

impl Default for ChannelMapper {
    fn default() -> Self {
        Self::new(Calibration::default(), true, true)
    }
}

impl ChannelMapper {
    #[must_use]
    pub fn new(calibration: Calibration, invert_throttle: bool, invert_pitch: bool) -> Self {
        Self {
            calibration,
            invert_throttle,
            invert_pitch,
            throttle_channel: channels::THROTTLE,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let controller = &config.controller;
        Self::new(
            Calibration::new(controller.deadzone, controller.expo),
            controller.invert_throttle,
            controller.invert_pitch,
        )
        .with_throttle_channel(config.channels.throttle_channel)
    }

    /// Puts the throttle stick on `channel` (1-based)
    #[must_use]
    pub fn with_throttle_channel(mut self, channel: usize) -> Self {
        self.throttle_channel = channel;
        self
    }

    pub fn throttle_channel(&self) -> usize {
        self.throttle_channel
    }

    fn stick_channel(&self, channel: usize) -> usize {
        if channel == self.throttle_channel {
            channels::THROTTLE
        } else {
            channel
        }
    }

    /// Channel/value pairs for the four stick channels
    #[must_use]
    pub fn map(&self, axes: &JoystickAxes) -> [(usize, u16); 4] {
        let flip = |value: f32, invert: bool| if invert { -value } else { value };
        [
            (self.stick_channel(channels::YAW), self.calibration.to_us(axes.yaw)),
            (
                self.throttle_channel,
                self.calibration.to_us(flip(axes.throttle, self.invert_throttle)),
            ),
            (self.stick_channel(channels::ROLL), self.calibration.to_us(axes.roll)),
            (
                self.stick_channel(channels::PITCH),
                self.calibration.to_us(flip(axes.pitch, self.invert_pitch)),
            ),
        ]
    }

    /// Writes the mapped values into the shared channels
    pub fn apply(&self, axes: &JoystickAxes, state: &SharedState) {
        state.set_channels(&self.map(axes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::link::LinkMonitor;
    use std::time::Duration;

    fn value_of(pairs: &[(usize, u16)], channel: usize) -> u16 {
        pairs
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, v)| *v)
            .unwrap()
    }

    #[test]
    fn test_centered_sticks() {
        let mapped = ChannelMapper::default().map(&JoystickAxes::default());
        for channel in 1..=4 {
            assert_eq!(value_of(&mapped, channel), 1500);
        }
    }

    #[test]
    fn test_stick_up_is_full_throttle() {
        let axes = JoystickAxes {
            throttle: -1.0,
            pitch: -1.0,
            ..Default::default()
        };
        let mapped = ChannelMapper::default().map(&axes);
        assert_eq!(value_of(&mapped, channels::THROTTLE), 2000);
        assert_eq!(value_of(&mapped, channels::PITCH), 2000);
    }

    #[test]
    fn test_roll_and_yaw_not_inverted() {
        let axes = JoystickAxes {
            yaw: 1.0,
            roll: -1.0,
            ..Default::default()
        };
        let mapped = ChannelMapper::default().map(&axes);
        assert_eq!(value_of(&mapped, channels::YAW), 2000);
        assert_eq!(value_of(&mapped, channels::ROLL), 1000);
    }

    #[test]
    fn test_inversion_can_be_disabled() {
        let mapper = ChannelMapper::new(Calibration::linear(), false, false);
        let axes = JoystickAxes {
            throttle: -1.0,
            pitch: 0.5,
            ..Default::default()
        };
        let mapped = mapper.map(&axes);
        assert_eq!(value_of(&mapped, channels::THROTTLE), 1000);
        assert_eq!(value_of(&mapped, channels::PITCH), 1750);
    }

    #[test]
    fn test_apply_leaves_aux_channels() {
        let state = SharedState::new(LinkMonitor::new(Duration::from_millis(300), false), 1500, 3, 1000);
        state.set_channel(5, 1900);

        let axes = JoystickAxes {
            roll: 1.0,
            ..Default::default()
        };
        ChannelMapper::default().apply(&axes, &state);

        let channels = state.channels();
        assert_eq!(channels.get(1), Some(2000));
        assert_eq!(channels.get(3), Some(1500));
        assert_eq!(channels.get(5), Some(1900));
    }

    #[test]
    fn test_throttle_follows_configured_channel() {
        let mapper = ChannelMapper::default().with_throttle_channel(1);
        let axes = JoystickAxes {
            throttle: -1.0,
            roll: 1.0,
            ..Default::default()
        };
        let mapped = mapper.map(&axes);
        assert_eq!(value_of(&mapped, 1), 2000);
        // roll takes the slot throttle left
        assert_eq!(value_of(&mapped, channels::THROTTLE), 2000);
        assert_eq!(value_of(&mapped, channels::PITCH), 1500);
        assert_eq!(value_of(&mapped, channels::YAW), 1500);

        let mut seen: Vec<usize> = mapped.iter().map(|(ch, _)| *ch).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);

        let aux = ChannelMapper::default().with_throttle_channel(6).map(&axes);
        assert_eq!(value_of(&aux, 6), 2000);
        assert_eq!(value_of(&aux, channels::ROLL), 2000);
        assert!(aux.iter().all(|(ch, _)| *ch != channels::THROTTLE));
    }

    #[test]
    fn test_failsafe_holds_joystick_throttle_on_configured_channel() {
        // link never established, so fail-safe is active
        let state = SharedState::new(LinkMonitor::new(Duration::from_millis(300), false), 1500, 1, 1000);
        let mut config = Config::default();
        config.channels.throttle_channel = 1;
        let mapper = ChannelMapper::from_config(&config);
        assert_eq!(mapper.throttle_channel(), 1);

        let axes = JoystickAxes {
            throttle: -1.0,
            ..Default::default()
        };
        mapper.apply(&axes, &state);

        let (channels, forced) = state.transmit_snapshot();
        assert!(forced);
        assert_eq!(channels.get(1), Some(1000));
        assert!((2..=16).all(|ch| channels.get(ch) != Some(2000)));
    }
}
