//! # Channel State
//!
//! The one piece of mutable state shared between the control loop, the
//! remote bridge and the telemetry worker: the 16 outgoing channels, the
//! link monitor and the control mode, all behind a single lock.
//!
//! The lock is only held for copies and field assignments. Callers must
//! never hold a guard across an `.await` or a transport call, which the API
//! enforces by never handing out a guard.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use super::link::{LinkMonitor, LinkTransition};
use crate::config::Config;
use crate::crsf::protocol::{ChannelSet, CHANNEL_US_MAX, CHANNEL_US_MIN, CRSF_NUM_CHANNELS};

/// Source of the roll/pitch/throttle/yaw channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Channels change only through remote commands
    #[default]
    Manual,
    /// Joystick axes overwrite the stick channels
    Joystick,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Manual => write!(f, "manual"),
            ControlMode::Joystick => write!(f, "joystick"),
        }
    }
}

impl FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(ControlMode::Manual),
            "joystick" => Ok(ControlMode::Joystick),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Copy of the link monitor's observable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub up: bool,
    pub last_receive: Option<Instant>,
    pub requires_failsafe: bool,
}

impl LinkStatus {
    fn of(link: &LinkMonitor) -> Self {
        Self {
            up: link.is_up(),
            last_receive: link.last_receive(),
            requires_failsafe: link.requires_failsafe(),
        }
    }
}

/// Consistent view of the whole state, taken under one lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub link: LinkStatus,
    /// Channels as they go on the wire, fail-safe throttle applied
    pub channels: ChannelSet,
    /// Whether fail-safe replaced the commanded throttle
    pub forced: bool,
    pub mode: ControlMode,
}

#[derive(Debug)]
struct Inner {
    channels: ChannelSet,
    link: LinkMonitor,
    mode: ControlMode,
}

/// Cloneable handle to the shared channel/link state
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
    throttle_channel: usize,
    failsafe_throttle: u16,
    started: Instant,
}

/// Returns `true` if `value` is a legal channel value in microseconds
pub fn is_valid_channel_value(value: u16) -> bool {
    (CHANNEL_US_MIN..=CHANNEL_US_MAX).contains(&value)
}

/// Startup channels: everything at `default_value`, throttle at the safe value
pub fn safe_defaults(default_value: u16, throttle_channel: usize, failsafe_throttle: u16) -> ChannelSet {
    let mut channels = ChannelSet([default_value; CRSF_NUM_CHANNELS]);
    channels.set(throttle_channel, failsafe_throttle);
    channels
}

impl SharedState {
    pub fn new(link: LinkMonitor, default_value: u16, throttle_channel: usize, failsafe_throttle: u16) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                channels: safe_defaults(default_value, throttle_channel, failsafe_throttle),
                link,
                mode: ControlMode::Manual,
            })),
            throttle_channel,
            failsafe_throttle,
            started: Instant::now(),
        }
    }

    /// Builds the state from configuration
    ///
    /// `telemetry_disabled` is OR-ed with `safety.telemetry_disabled` so the
    /// command line flag can only relax the startup check, never re-enable it.
    pub fn from_config(config: &Config, telemetry_disabled: bool) -> Self {
        let link = LinkMonitor::new(
            config.safety.failsafe_timeout(),
            telemetry_disabled || config.safety.telemetry_disabled,
        );
        Self::new(
            link,
            config.channels.default_value,
            config.channels.throttle_channel,
            config.safety.failsafe_throttle,
        )
    }

    /// Instant the state was created; telemetry times are relative to it
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn throttle_channel(&self) -> usize {
        self.throttle_channel
    }

    pub fn failsafe_throttle(&self) -> u16 {
        self.failsafe_throttle
    }

    /// Copy of the current channels
    pub fn channels(&self) -> ChannelSet {
        self.inner.lock().channels
    }

    /// Sets one 1-based channel
    ///
    /// Returns false, leaving the state untouched, if the channel or value
    /// is out of range.
    pub fn set_channel(&self, channel: usize, value: u16) -> bool {
        if !is_valid_channel_value(value) {
            return false;
        }
        self.inner.lock().channels.set(channel, value)
    }

    /// Applies a batch of updates under one lock acquisition
    ///
    /// Returns how many entries were applied; invalid entries are skipped.
    pub fn set_channels(&self, updates: &[(usize, u16)]) -> usize {
        let mut inner = self.inner.lock();
        updates
            .iter()
            .filter(|(channel, value)| is_valid_channel_value(*value) && inner.channels.set(*channel, *value))
            .count()
    }

    /// Replaces every channel at once
    pub fn replace_channels(&self, channels: ChannelSet) {
        self.inner.lock().channels = channels;
    }

    pub fn mode(&self) -> ControlMode {
        self.inner.lock().mode
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.inner.lock().mode = mode;
    }

    pub fn link_status(&self) -> LinkStatus {
        LinkStatus::of(&self.inner.lock().link)
    }

    /// Records a valid inbound frame
    pub fn on_frame(&self, now: Instant) -> Option<LinkTransition> {
        self.inner.lock().link.on_frame(now)
    }

    /// Evaluates the link timeout
    ///
    /// On loss the stored throttle is lowered to the safe value, so it stays
    /// low after the link comes back until something raises it again.
    pub fn evaluate_link(&self, now: Instant) -> Option<LinkTransition> {
        let mut inner = self.inner.lock();
        let transition = inner.link.evaluate(now);
        if transition == Some(LinkTransition::Lost) {
            let throttle = self.failsafe_throttle;
            inner.channels.set(self.throttle_channel, throttle);
        }
        transition
    }

    /// Channels to put on the wire now
    ///
    /// While the link requires fail-safe the throttle is forced to the safe
    /// value regardless of what was commanded. The flag reports whether that
    /// happened.
    pub fn transmit_snapshot(&self) -> (ChannelSet, bool) {
        let inner = self.inner.lock();
        self.outgoing(&inner)
    }

    /// Link, transmitted channels and mode from the same instant
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock();
        let (channels, forced) = self.outgoing(&inner);
        StateSnapshot {
            link: LinkStatus::of(&inner.link),
            channels,
            forced,
            mode: inner.mode,
        }
    }

    fn outgoing(&self, inner: &Inner) -> (ChannelSet, bool) {
        let mut channels = inner.channels;
        let forced = inner.link.requires_failsafe();
        if forced {
            channels.set(self.throttle_channel, self.failsafe_throttle);
        }
        (channels, forced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state(telemetry_disabled: bool) -> SharedState {
        SharedState::new(
            LinkMonitor::new(Duration::from_millis(300), telemetry_disabled),
            1500,
            3,
            1000,
        )
    }

    #[test]
    fn test_safe_defaults() {
        let channels = state(false).channels();
        assert_eq!(channels.get(3), Some(1000));
        for ch in [1, 2, 4, 5, 16] {
            assert_eq!(channels.get(ch), Some(1500));
        }
    }

    #[test]
    fn test_set_channel_validates() {
        let state = state(false);
        assert!(state.set_channel(5, 1700));
        assert!(!state.set_channel(5, 2100));
        assert!(!state.set_channel(0, 1500));
        assert!(!state.set_channel(17, 1500));
        assert_eq!(state.channels().get(5), Some(1700));
    }

    #[test]
    fn test_set_channel_is_idempotent() {
        let once = state(false);
        once.set_channel(5, 1700);

        let many = state(false);
        for _ in 0..10 {
            many.set_channel(5, 1700);
        }
        assert_eq!(once.channels(), many.channels());
    }

    #[test]
    fn test_set_channels_skips_invalid_entries() {
        let state = state(false);
        let applied = state.set_channels(&[(1, 1200), (3, 1800), (20, 1500), (4, 999)]);
        assert_eq!(applied, 2);
        assert_eq!(state.channels().get(1), Some(1200));
        assert_eq!(state.channels().get(3), Some(1800));
        assert_eq!(state.channels().get(4), Some(1500));
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Joystick".parse::<ControlMode>(), Ok(ControlMode::Joystick));
        assert_eq!("manual".parse::<ControlMode>(), Ok(ControlMode::Manual));
        assert!("auto".parse::<ControlMode>().is_err());
        assert_eq!(ControlMode::Joystick.to_string(), "joystick");
        assert_eq!(serde_json::to_string(&ControlMode::Manual).unwrap(), "\"manual\"");
    }

    #[test]
    fn test_never_established_link_forces_throttle() {
        let state = state(false);
        state.set_channel(3, 1800);
        let (channels, forced) = state.transmit_snapshot();
        assert!(forced);
        assert_eq!(channels.get(3), Some(1000));
        // the commanded value is kept for when the link comes up
        assert_eq!(state.channels().get(3), Some(1800));
    }

    #[test]
    fn test_telemetry_disabled_does_not_force_before_first_frame() {
        let state = state(true);
        state.set_channel(3, 1800);
        let (channels, forced) = state.transmit_snapshot();
        assert!(!forced);
        assert_eq!(channels.get(3), Some(1800));
    }

    #[test]
    fn test_link_loss_lowers_stored_throttle() {
        let state = state(false);
        let start = Instant::now();
        state.on_frame(start);
        state.set_channel(3, 1800);

        let (channels, forced) = state.transmit_snapshot();
        assert!(!forced);
        assert_eq!(channels.get(3), Some(1800));

        assert_eq!(
            state.evaluate_link(start + Duration::from_millis(301)),
            Some(LinkTransition::Lost)
        );
        assert_eq!(state.channels().get(3), Some(1000));

        // commands during the outage are stored but not transmitted
        state.set_channel(3, 1900);
        let (channels, forced) = state.transmit_snapshot();
        assert!(forced);
        assert_eq!(channels.get(3), Some(1000));
    }

    #[test]
    fn test_snapshot_reports_transmitted_channels() {
        let state = state(false);
        state.set_mode(ControlMode::Joystick);
        state.set_channel(3, 1800);

        let snapshot = state.snapshot();
        assert!(!snapshot.link.up);
        assert!(snapshot.link.requires_failsafe);
        assert!(snapshot.forced);
        assert_eq!(snapshot.channels.get(3), Some(1000));
        assert_eq!(snapshot.mode, ControlMode::Joystick);
        assert_eq!((snapshot.channels, snapshot.forced), state.transmit_snapshot());

        state.on_frame(Instant::now());
        let snapshot = state.snapshot();
        assert!(snapshot.link.up && !snapshot.forced);
        assert_eq!(snapshot.channels.get(3), Some(1800));
    }

    #[test]
    fn test_clones_share_state() {
        let a = state(false);
        let b = a.clone();
        a.set_mode(ControlMode::Joystick);
        b.set_channel(7, 1234);
        assert_eq!(b.mode(), ControlMode::Joystick);
        assert_eq!(a.channels().get(7), Some(1234));
    }
}
