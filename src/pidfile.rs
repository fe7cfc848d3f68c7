//! The identity store: a plain-text file holding the supervised
//! process's ID between invocations.
//!
//! The file is read and written without any locking. Only one
//! supervisor invocation may act on a given PID file at a time; two
//! racing launches will leave one of the servers untracked.

use crate::process::ProcessId;
use anyhow::{Context, Result};
use slog_scope::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PidFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `pid`, replacing whatever was recorded before.
    pub fn write(&self, pid: ProcessId) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Could not create PID file directory {:?}", dir))?;
        }
        fs::write(&self.path, format!("{}\n", pid))
            .with_context(|| format!("Could not write PID file {:?}", &self.path))?;
        debug!("recorded pid"; "pid" => pid.as_raw(), "path" => ?&self.path);
        Ok(())
    }

    /// Returns the recorded PID. A missing file or contents that don't
    /// parse as a PID both count as "no record".
    pub fn read(&self) -> Result<Option<ProcessId>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read PID file {:?}", &self.path))
            }
        };
        match contents.parse::<ProcessId>() {
            Ok(pid) => Ok(Some(pid)),
            Err(e) => {
                warn!("ignoring bad PID file contents"; "path" => ?&self.path, "error" => %e);
                Ok(None)
            }
        }
    }

    /// Removes the record. Removing an absent record is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Could not remove PID file {:?}", &self.path)),
        }
    }
}
