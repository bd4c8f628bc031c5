//! File-based command spool.
//!
//! A producer drops a text file of command lines at a well-known path; the
//! control loop claims it by renaming it to a private name, reads it and
//! deletes it. Rename is atomic, so a file is either claimed whole or not at
//! all, and a producer writing through [`CommandSpool::submit`] never exposes
//! a half-written file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CommandSpool {
    path: PathBuf,
    claim_path: PathBuf,
}

impl CommandSpool {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut claim = path.clone().into_os_string();
        claim.push(format!(".claimed.{}", std::process::id()));
        Self {
            path,
            claim_path: PathBuf::from(claim),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claims and reads the pending spool file, if any
    pub fn take(&self) -> Result<Option<String>> {
        match fs::rename(&self.path, &self.claim_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let contents = fs::read_to_string(&self.claim_path);
        // remove even if the read failed, the claim is ours either way
        let removed = fs::remove_file(&self.claim_path);
        let contents = contents?;
        removed?;

        debug!("Claimed command spool {} ({} bytes)", self.path.display(), contents.len());
        Ok(Some(contents))
    }

    /// Atomically publishes a batch of command lines
    ///
    /// An unclaimed earlier batch is replaced, not appended to.
    pub fn submit<S: AsRef<str>>(&self, lines: &[S]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        for line in lines {
            writeln!(file, "{}", line.as_ref())?;
        }
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
