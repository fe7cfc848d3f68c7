use crate::pidfile::PidFile;
use crate::process::{self, Presence, ProcessId};
use anyhow::Result;
use slog_scope::debug;
use std::fmt;

/// What we know about the supervised server.
#[derive(Debug, PartialEq)]
pub enum Status {
    /// Nothing has been launched, or it was stopped.
    NoRecord,

    /// A PID is recorded, but that process is no longer running.
    Stale(ProcessId),

    /// The recorded process is running.
    Alive(ProcessId),

    /// The OS could not tell us (e.g. permission denied).
    Unknown(ProcessId, String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::NoRecord => write!(f, "no PID file exists, the server is not running"),
            Status::Stale(pid) => write!(
                f,
                "PID file names {}, but that process is not running",
                pid
            ),
            Status::Alive(pid) => write!(f, "running with PID {}", pid),
            Status::Unknown(pid, reason) => {
                write!(f, "could not check status of PID {}: {}", pid, reason)
            }
        }
    }
}

/// Reports on the process recorded in `pidfile`, without touching the
/// record. Failing to read the record is an error; failing to query
/// the OS is an [`Status::Unknown`].
pub fn status(pidfile: &PidFile) -> Result<Status> {
    let pid = match pidfile.read()? {
        None => return Ok(Status::NoRecord),
        Some(pid) => pid,
    };
    let status = classify(pid, process::presence(pid));
    debug!("checked status"; "pid" => pid.as_raw(), "status" => ?status);
    Ok(status)
}

fn classify(pid: ProcessId, presence: Result<Presence>) -> Status {
    match presence {
        Ok(Presence::Running) => Status::Alive(pid),
        Ok(Presence::Gone) => Status::Stale(pid),
        Err(e) => Status::Unknown(pid, format!("{:#}", e)),
    }
}
