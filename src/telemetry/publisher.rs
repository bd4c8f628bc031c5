//! Periodic telemetry worker.
//!
//! Every `publish_interval` the worker captures a [`TelemetryReport`] from the
//! shared state and the sensor store, replaces the value in its watch channel
//! and, when configured, rewrites the binary record file and appends to the
//! JSONL log.

use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::logger::TelemetryLogger;
use super::record::{TelemetryRecord, TelemetryReport};
use super::store::TelemetryStore;
use crate::control::state::SharedState;
use crate::error::Result;

/// Writes the record next to `path` and renames it into place
///
/// Readers opening `path` see either the previous record or this one, never
/// a partial write.
pub fn write_record_file(path: &Path, record: &TelemetryRecord) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&record.to_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub struct TelemetryPublisher {
    state: SharedState,
    sensors: TelemetryStore,
    period: Duration,
    record_path: Option<PathBuf>,
    logger: Option<(TelemetryLogger, Duration)>,
    last_logged: Option<Instant>,
    tx: watch::Sender<TelemetryReport>,
}

impl TelemetryPublisher {
    /// Creates the worker and the receiver readers use to get the latest report
    pub fn new(
        state: SharedState,
        sensors: TelemetryStore,
        period: Duration,
    ) -> (Self, watch::Receiver<TelemetryReport>) {
        let (tx, rx) = watch::channel(TelemetryReport::default());
        let publisher = Self {
            state,
            sensors,
            period,
            record_path: None,
            logger: None,
            last_logged: None,
            tx,
        };
        (publisher, rx)
    }

    /// Also publish the binary record to `path`
    pub fn with_record_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.record_path = Some(path.into());
        self
    }

    /// Also append reports to a JSONL log, at most once per `interval`
    pub fn with_logger(mut self, logger: TelemetryLogger, interval: Duration) -> Self {
        self.logger = Some((logger, interval));
        self
    }

    /// Captures and publishes one report
    ///
    /// The watch value is always replaced; file and log errors are returned
    /// after that so the in-memory view never goes stale.
    pub fn publish_once(&mut self) -> Result<TelemetryReport> {
        let now = Instant::now();
        let sensors = self.sensors.snapshot();
        let timestamp_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let report = TelemetryReport::capture(&self.state, &sensors, now, timestamp_ms);

        self.tx.send_replace(report.clone());

        if let Some(path) = &self.record_path {
            write_record_file(path, &TelemetryRecord::from(&report))?;
        }

        if let Some((logger, interval)) = self.logger.as_mut() {
            let due = self
                .last_logged
                .map_or(true, |at| now.saturating_duration_since(at) >= *interval);
            if due {
                self.last_logged = Some(now);
                logger.log(&report)?;
            }
        }

        Ok(report)
    }

    /// Runs forever at the configured cadence
    pub async fn run(mut self) {
        info!(
            "Telemetry publisher running every {:?}{}",
            self.period,
            self.record_path
                .as_ref()
                .map(|p| format!(", record file {}", p.display()))
                .unwrap_or_default()
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u64 = 0;

        loop {
            ticker.tick().await;
            match self.publish_once() {
                Ok(report) => {
                    if failures > 0 {
                        info!("Telemetry publishing recovered after {} failures", failures);
                        failures = 0;
                    }
                    debug!("Published telemetry (link up: {})", report.link.up);
                }
                Err(e) => {
                    failures += 1;
                    // one warning per burst of failures
                    if failures == 1 {
                        warn!("Telemetry publish failed: {}", e);
                    }
                }
            }
        }
    }
}
