//! # Link Monitor
//!
//! Two-state health tracker for the flight controller link.
//!
//! Any valid inbound frame brings the link up immediately. The link goes down
//! once no frame has been seen for longer than the fail-safe timeout. While
//! the link is down the control loop forces the throttle to its safe value.

use std::time::{Duration, Instant};

/// Edge reported when the link state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    /// A frame arrived while the link was down (or never up)
    Restored,
    /// The fail-safe timeout elapsed without a frame
    Lost,
}

/// Link health state machine
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    timeout: Duration,
    telemetry_disabled: bool,
    up: bool,
    last_receive: Option<Instant>,
}

impl LinkMonitor {
    /// Creates a monitor in the down state with no frame seen yet
    ///
    /// With `telemetry_disabled` set, a link that has never carried a frame
    /// does not require fail-safe; once a frame was seen the timeout applies
    /// as usual.
    pub fn new(timeout: Duration, telemetry_disabled: bool) -> Self {
        Self {
            timeout,
            telemetry_disabled,
            up: false,
            last_receive: None,
        }
    }

    /// Records a valid inbound frame
    pub fn on_frame(&mut self, now: Instant) -> Option<LinkTransition> {
        self.last_receive = Some(now);
        if self.up {
            None
        } else {
            self.up = true;
            Some(LinkTransition::Restored)
        }
    }

    /// Checks the receive timeout
    pub fn evaluate(&mut self, now: Instant) -> Option<LinkTransition> {
        match self.last_receive {
            Some(last) if self.up && now.saturating_duration_since(last) > self.timeout => {
                self.up = false;
                Some(LinkTransition::Lost)
            }
            _ => None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn last_receive(&self) -> Option<Instant> {
        self.last_receive
    }

    pub fn ever_received(&self) -> bool {
        self.last_receive.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True when outgoing frames must carry the safe throttle
    pub fn requires_failsafe(&self) -> bool {
        if self.up {
            return false;
        }
        self.ever_received() || !self.telemetry_disabled
    }
}
