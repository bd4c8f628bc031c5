//! # Control Loop
//!
//! Fixed-period loop that owns the serial transport.
//!
//! Each iteration:
//! 1. reads whatever bytes arrived (bounded wait) and dispatches complete frames
//! 2. evaluates the link timeout
//! 3. applies queued remote commands (channel queue, then spool file)
//! 4. samples the joystick when in joystick mode
//! 5. transmits the channels when the send period elapsed, or earlier when a
//!    command asked for it and the minimum gap since the last send elapsed
//!
//! The shared state lock is never held across the transport calls.

use std::io;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::command::{parse_batch, RemoteCommand};
use super::link::LinkTransition;
use super::spool::CommandSpool;
use super::state::{ControlMode, SharedState};
use crate::config::Config;
use crate::controller::{ChannelMapper, JoystickAxes};
use crate::crsf::encoder::encode_channel_set_frame;
use crate::crsf::packet::Packet;
use crate::crsf::reader::{FrameReader, ReaderStats};
use crate::serial::SerialPortIO;
use crate::telemetry::TelemetryStore;

/// Number of packets between status log messages
pub const LOG_INTERVAL_PACKETS: u64 = 1000;

const READ_BUF_SIZE: usize = 256;

/// Sending half of the control loop's command queue
pub type CommandSender = mpsc::Sender<RemoteCommand>;

/// Creates the bounded command queue
pub fn command_channel(capacity: usize) -> (CommandSender, mpsc::Receiver<RemoteCommand>) {
    mpsc::channel(capacity.max(1))
}

/// Loop timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Iteration period
    pub tick: Duration,
    /// Regular transmit period
    pub send_period: Duration,
    /// Minimum spacing of command-triggered sends
    pub min_send_gap: Duration,
    /// Longest wait for inbound bytes per iteration
    pub read_timeout: Duration,
    /// Longest wait for one frame to be written
    pub write_timeout: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1),
            send_period: Duration::from_millis(10),
            min_send_gap: Duration::from_millis(2),
            read_timeout: Duration::from_millis(1),
            write_timeout: Duration::from_millis(10),
        }
    }
}

impl LoopTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: Duration::from_millis(config.crsf.loop_period_ms),
            send_period: Duration::from_millis(config.crsf.send_period_ms),
            min_send_gap: Duration::from_millis(config.crsf.min_send_gap_ms),
            read_timeout: Duration::from_millis(config.serial.timeout_ms),
            write_timeout: Duration::from_millis(config.serial.write_timeout_ms),
        }
    }
}

/// Counters kept by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub unknown_frames: u64,
    pub send_errors: u64,
    pub read_errors: u64,
    pub commands_applied: u64,
    pub failsafe_frames: u64,
    pub reader: ReaderStats,
}

pub struct ControlLoop<P: SerialPortIO> {
    port: P,
    state: SharedState,
    sensors: TelemetryStore,
    reader: FrameReader,
    commands: mpsc::Receiver<RemoteCommand>,
    spool: Option<CommandSpool>,
    joystick: Option<(watch::Receiver<JoystickAxes>, ChannelMapper)>,
    timing: LoopTiming,
    rc_passthrough: bool,
    need_send: bool,
    last_send: Option<Instant>,
    last_mode: ControlMode,
    stats: LoopStats,
    last_log_count: u64,
    send_failing: bool,
}

impl<P: SerialPortIO> ControlLoop<P> {
    pub fn new(
        port: P,
        state: SharedState,
        sensors: TelemetryStore,
        commands: mpsc::Receiver<RemoteCommand>,
        timing: LoopTiming,
    ) -> Self {
        let last_mode = state.mode();
        Self {
            port,
            state,
            sensors,
            reader: FrameReader::new(),
            commands,
            spool: None,
            joystick: None,
            timing,
            rc_passthrough: false,
            need_send: false,
            last_send: None,
            last_mode,
            stats: LoopStats::default(),
            last_log_count: 0,
            send_failing: false,
        }
    }

    /// Also consume command batches from a spool file
    pub fn with_spool(mut self, spool: CommandSpool) -> Self {
        self.spool = Some(spool);
        self
    }

    /// Use joystick samples while in joystick mode
    pub fn with_joystick(mut self, axes: watch::Receiver<JoystickAxes>, mapper: ChannelMapper) -> Self {
        self.joystick = Some((axes, mapper));
        self
    }

    /// Apply RC channel frames received from the flight controller
    pub fn with_rc_passthrough(mut self, enabled: bool) -> Self {
        self.rc_passthrough = enabled;
        self
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            reader: self.reader.stats(),
            ..self.stats
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Runs until the task is dropped
    pub async fn run(mut self) {
        info!(
            "Control loop running: tick {:?}, send period {:?}, min gap {:?}",
            self.timing.tick, self.timing.send_period, self.timing.min_send_gap
        );

        let mut ticker = interval(self.timing.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.step(Instant::now()).await;
        }
    }

    /// One loop iteration at time `now`
    pub async fn step(&mut self, now: Instant) {
        self.receive(now).await;

        if self.state.evaluate_link(now) == Some(LinkTransition::Lost) {
            warn!(
                "Link lost: no valid frame for over {:?}, forcing throttle to {}",
                now.saturating_duration_since(self.state.link_status().last_receive.unwrap_or(now)),
                self.state.failsafe_throttle()
            );
        }

        self.ingest_commands();
        self.sample_joystick();

        if self.send_due(now) {
            self.transmit(now).await;
        }
    }

    async fn receive(&mut self, now: Instant) {
        let mut buf = [0u8; READ_BUF_SIZE];
        match self.port.read_timeout(&mut buf, self.timing.read_timeout).await {
            Ok(0) => {}
            Ok(n) => self.reader.push(&buf[..n]),
            Err(e) => {
                self.stats.read_errors += 1;
                if self.stats.read_errors == 1 || self.stats.read_errors % LOG_INTERVAL_PACKETS == 0 {
                    warn!("Serial read failed ({} so far): {}", self.stats.read_errors, e);
                }
                return;
            }
        }

        while let Some(frame) = self.reader.next_frame() {
            self.stats.frames_received += 1;
            if self.state.on_frame(now) == Some(LinkTransition::Restored) {
                info!("Link up (frame type 0x{:02X})", frame.frame_type);
            }

            match Packet::from_frame(&frame) {
                Packet::Telemetry(telemetry) => {
                    trace!("Telemetry: {:?}", telemetry);
                    self.sensors.update(telemetry);
                }
                Packet::RcChannels(channels) => {
                    self.sensors.set_rc_input(channels);
                    if self.rc_passthrough {
                        self.state.replace_channels(channels);
                        self.need_send = true;
                    }
                }
                Packet::Unknown { frame_type, len } => {
                    self.stats.unknown_frames += 1;
                    trace!("Skipping frame type 0x{:02X} ({} bytes)", frame_type, len);
                }
            }
        }
    }

    fn ingest_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("Applying command: {}", command);
            self.need_send |= command.apply(&self.state);
            self.stats.commands_applied += 1;
        }

        let Some(spool) = &self.spool else {
            return;
        };

        match spool.take() {
            Ok(Some(contents)) => {
                let batch = parse_batch(contents.lines());
                debug!(
                    "Spool batch: {} commands, {} skipped",
                    batch.commands.len(),
                    batch.skipped
                );
                for command in &batch.commands {
                    self.need_send |= command.apply(&self.state);
                    self.stats.commands_applied += 1;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read command spool {}: {}", spool.path().display(), e),
        }
    }

    fn sample_joystick(&mut self) {
        let mode = self.state.mode();
        let entered = mode != self.last_mode;
        self.last_mode = mode;

        if mode != ControlMode::Joystick {
            return;
        }

        let Some((axes, mapper)) = self.joystick.as_mut() else {
            if entered {
                warn!("Joystick mode requested but no joystick is available; channels stay manual");
            }
            return;
        };

        match axes.has_changed() {
            Ok(changed) if changed || entered => {
                let sample = *axes.borrow_and_update();
                mapper.apply(&sample, &self.state);
                self.need_send = true;
            }
            Ok(_) => {}
            Err(_) => {
                warn!("Joystick disconnected; channels stay manual");
                self.joystick = None;
            }
        }
    }

    fn send_due(&self, now: Instant) -> bool {
        let Some(last) = self.last_send else {
            return true;
        };
        let elapsed = now.saturating_duration_since(last);
        elapsed >= self.timing.send_period || (self.need_send && elapsed >= self.timing.min_send_gap)
    }

    async fn transmit(&mut self, now: Instant) {
        let (channels, forced) = self.state.transmit_snapshot();
        let frame = encode_channel_set_frame(&channels);

        self.last_send = Some(now);
        self.need_send = false;
        if forced {
            self.stats.failsafe_frames += 1;
        }

        // a stalled transport must not stop link evaluation
        let write = self.port.send_packet(&frame);
        let sent = match tokio::time::timeout(self.timing.write_timeout, write).await {
            Ok(result) => result,
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write not accepted within {:?}", self.timing.write_timeout),
            )),
        };

        match sent {
            Ok(()) => {
                if self.send_failing {
                    info!("Serial writes recovered");
                    self.send_failing = false;
                }
                self.stats.frames_sent += 1;
            }
            Err(e) => {
                self.stats.send_errors += 1;
                if !self.send_failing {
                    warn!("Failed to send channels: {}", e);
                    self.send_failing = true;
                }
                return;
            }
        }

        if self.stats.frames_sent - self.last_log_count >= LOG_INTERVAL_PACKETS {
            let reader = self.reader.stats();
            info!(
                "Sent {} frames, received {} ({} CRC errors, {} send errors, link {})",
                self.stats.frames_sent,
                self.stats.frames_received,
                reader.crc_errors,
                self.stats.send_errors,
                if forced { "down" } else { "up" }
            );
            self.last_log_count = self.stats.frames_sent;
        }
    }
}
