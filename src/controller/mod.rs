//! # Controller Module
//!
//! Optional joystick input for the slave's joystick mode.
//!
//! This module handles:
//! - Joystick detection and reading via evdev ([`joystick`])
//! - Normalizing raw axis events ([`mapper`])
//! - Applying deadzone and expo ([`calibration`])
//! - Mapping axes to the stick channels ([`channel_mapper`])

pub mod calibration;
pub mod channel_mapper;
pub mod joystick;
pub mod mapper;

pub use channel_mapper::ChannelMapper;
pub use joystick::Joystick;
pub use mapper::JoystickAxes;
