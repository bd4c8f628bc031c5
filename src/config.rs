//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, see [`Config::default`]) yields a working slave configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub crsf: CrsfConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound for one read per loop iteration
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for writing one frame; a stalled write counts as a send error
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Joystick configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_controller_enabled")]
    pub enabled: bool,

    /// Empty means auto-detect
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_deadzone")]
    pub deadzone: f32,

    #[serde(default)]
    pub expo: f32,

    #[serde(default = "default_invert")]
    pub invert_throttle: bool,

    #[serde(default = "default_invert")]
    pub invert_pitch: bool,
}

/// Channel defaults
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// Startup value of every channel except throttle
    #[serde(default = "default_channel_value")]
    pub default_value: u16,

    /// 1-based throttle channel
    #[serde(default = "default_throttle_channel")]
    pub throttle_channel: usize,
}

/// Fail-safe configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_failsafe_timeout_ms")]
    pub failsafe_timeout_ms: u64,

    /// Throttle value forced while the link is down
    #[serde(default = "default_failsafe_throttle")]
    pub failsafe_throttle: u16,

    /// Do not treat a never-established link as down
    #[serde(default)]
    pub telemetry_disabled: bool,
}

/// CRSF timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CrsfConfig {
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,

    #[serde(default = "default_send_period_ms")]
    pub send_period_ms: u64,

    #[serde(default = "default_min_send_gap_ms")]
    pub min_send_gap_ms: u64,

    /// Apply RC channel frames received from the flight controller
    #[serde(default)]
    pub rc_passthrough: bool,
}

/// Telemetry publication and logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Where the fixed-layout record is published; unset disables file output
    #[serde(default)]
    pub record_path: Option<String>,

    #[serde(default)]
    pub log_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Master/slave bridge configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Slave listen address
    #[serde(default = "default_bridge_listen")]
    pub listen: String,

    /// Slave address the master connects to
    #[serde(default = "default_slave_addr")]
    pub slave_addr: String,

    /// Master HTTP API listen address
    #[serde(default = "default_api_listen")]
    pub api_listen: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,

    /// Command spool file polled by the slave; unset disables it
    #[serde(default)]
    pub spool_path: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/serial0".to_string() }
fn default_baud_rate() -> u32 { 420000 }
fn default_timeout_ms() -> u64 { 1 }
fn default_write_timeout_ms() -> u64 { 10 }

fn default_controller_enabled() -> bool { true }
fn default_deadzone() -> f32 { 0.05 }
fn default_invert() -> bool { true }

fn default_channel_value() -> u16 { 1500 }
fn default_throttle_channel() -> usize { 3 }

fn default_failsafe_timeout_ms() -> u64 { 300 }
fn default_failsafe_throttle() -> u16 { 1000 }

fn default_loop_period_ms() -> u64 { 1 }
fn default_send_period_ms() -> u64 { 10 }
fn default_min_send_gap_ms() -> u64 { 2 }

fn default_publish_interval_ms() -> u64 { 20 }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_bridge_listen() -> String { "0.0.0.0:5760".to_string() }
fn default_slave_addr() -> String { "127.0.0.1:5760".to_string() }
fn default_api_listen() -> String { "0.0.0.0:8080".to_string() }
fn default_connect_timeout_ms() -> u64 { 1000 }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_command_queue_capacity() -> usize { 64 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: default_controller_enabled(),
            device_path: String::new(),
            deadzone: default_deadzone(),
            expo: 0.0,
            invert_throttle: default_invert(),
            invert_pitch: default_invert(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_value: default_channel_value(),
            throttle_channel: default_throttle_channel(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            failsafe_timeout_ms: default_failsafe_timeout_ms(),
            failsafe_throttle: default_failsafe_throttle(),
            telemetry_disabled: false,
        }
    }
}

impl Default for CrsfConfig {
    fn default() -> Self {
        Self {
            loop_period_ms: default_loop_period_ms(),
            send_period_ms: default_send_period_ms(),
            min_send_gap_ms: default_min_send_gap_ms(),
            rc_passthrough: false,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: default_publish_interval_ms(),
            record_path: None,
            log_enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: default_bridge_listen(),
            slave_addr: default_slave_addr(),
            api_listen: default_api_listen(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            command_queue_capacity: default_command_queue_capacity(),
            spool_path: None,
        }
    }
}

impl SafetyConfig {
    pub fn failsafe_timeout(&self) -> Duration {
        Duration::from_millis(self.failsafe_timeout_ms)
    }
}

impl BridgeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(msg: impl Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crsf_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![115200, 400000, 416666, 420000, 921600, 1870000, 3750000]
            .contains(&self.serial.baud_rate)
        {
            return Err(invalid(
                "baud_rate must be one of: 115200, 400000, 416666, 420000, 921600, 1870000, 3750000",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > self.crsf.loop_period_ms {
            return Err(invalid("timeout_ms must be between 1 and loop_period_ms"));
        }

        if self.serial.write_timeout_ms == 0 || self.serial.write_timeout_ms > 1000 {
            return Err(invalid("write_timeout_ms must be between 1 and 1000"));
        }

        if !(0.0..=0.5).contains(&self.controller.deadzone) {
            return Err(invalid("deadzone must be between 0.0 and 0.5"));
        }

        if !(0.0..=1.0).contains(&self.controller.expo) {
            return Err(invalid("expo must be between 0.0 and 1.0"));
        }

        if !(1000..=2000).contains(&self.channels.default_value) {
            return Err(invalid("default_value must be between 1000 and 2000"));
        }

        if !(1..=16).contains(&self.channels.throttle_channel) {
            return Err(invalid("throttle_channel must be between 1 and 16"));
        }

        if self.safety.failsafe_timeout_ms == 0 || self.safety.failsafe_timeout_ms > 60000 {
            return Err(invalid("failsafe_timeout_ms must be between 1 and 60000"));
        }

        if !(1000..=2000).contains(&self.safety.failsafe_throttle) {
            return Err(invalid("failsafe_throttle must be between 1000 and 2000"));
        }

        if self.crsf.loop_period_ms == 0 || self.crsf.loop_period_ms > 100 {
            return Err(invalid("loop_period_ms must be between 1 and 100"));
        }

        if self.crsf.send_period_ms < self.crsf.loop_period_ms || self.crsf.send_period_ms > 1000 {
            return Err(invalid(
                "send_period_ms must be between loop_period_ms and 1000",
            ));
        }

        if self.crsf.min_send_gap_ms > self.crsf.send_period_ms {
            return Err(invalid("min_send_gap_ms cannot exceed send_period_ms"));
        }

        if self.telemetry.publish_interval_ms == 0 || self.telemetry.publish_interval_ms > 60000 {
            return Err(invalid("publish_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.log_enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when logging is enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        if self.bridge.connect_timeout_ms == 0 || self.bridge.request_timeout_ms == 0 {
            return Err(invalid("bridge timeouts must be greater than 0"));
        }

        if self.bridge.command_queue_capacity == 0 {
            return Err(invalid("command_queue_capacity must be greater than 0"));
        }

        Ok(())
    }
}
