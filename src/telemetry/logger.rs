//! JSON Lines telemetry log with size-based rotation.
//!
//! One [`TelemetryReport`] per line, prefixed with a wall-clock timestamp.
//! A new file is started every `max_records_per_file` records and only the
//! newest `max_files_to_keep` files are retained.

use chrono::{Local, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::record::TelemetryReport;
use crate::error::Result;

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Serialize)]
struct LogLine<'a> {
    logged_at: String,
    #[serde(flatten)]
    report: &'a TelemetryReport,
}

/// Rotating JSONL writer
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files_created: u64,
}

impl TelemetryLogger {
    /// Creates the log directory if needed; no file is opened until the first record
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Telemetry log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files_created: 0,
        })
    }

    /// Appends one record, rotating first if the current file is full
    pub fn log(&mut self, report: &TelemetryReport) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(&LogLine {
            logged_at: Utc::now().to_rfc3339(),
            report,
        })?;

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    /// Log files currently on disk, oldest first
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:06}{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S_%3f"),
            self.files_created,
            FILE_SUFFIX
        );
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened telemetry log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files_created += 1;

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        for old in &files[..files.len() - self.max_files_to_keep] {
            if let Err(e) = fs::remove_file(old) {
                warn!("Failed to remove old telemetry log {}: {}", old.display(), e);
            }
        }
        Ok(())
    }
}
