//! The operating system's process control surface: identifiers,
//! detaching a command from the invoking process, asking whether a PID
//! still runs, and asking it to terminate.
//!
//! Nothing here holds on to a process handle. Every query re-resolves
//! the process from its numeric ID, since the supervisor itself exits
//! between invocations.

use std::{fmt, num::NonZeroU32, process::Command, str::FromStr};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use thiserror::Error;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as os;

/// A positive, OS-assigned process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(NonZeroU32);

impl ProcessId {
    /// Returns None for 0, which never denotes a process.
    pub fn new(raw: u32) -> Option<ProcessId> {
        NonZeroU32::new(raw).map(ProcessId)
    }

    pub fn as_raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("{0:?} is not a positive process ID")]
pub struct InvalidProcessId(pub String);

impl FromStr for ProcessId {
    type Err = InvalidProcessId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(ProcessId::new)
            .ok_or_else(|| InvalidProcessId(s.to_string()))
    }
}

/// What the OS process table says about a PID.
#[derive(Debug, PartialEq)]
pub enum Presence {
    Running,
    /// Either no process has that ID, or it has exited and only its
    /// exit status remains to be collected.
    Gone,
}

/// The result of trying to deliver a termination request.
#[derive(Debug, PartialEq, Clone)]
pub enum Delivery {
    Delivered,
    NoSuchProcess,
    PermissionDenied,
    Failed(String),
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Delivered => write!(f, "delivered"),
            Delivery::NoSuchProcess => write!(f, "no such process"),
            Delivery::PermissionDenied => write!(f, "permission denied"),
            Delivery::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Arranges for the command's process to outlive the invoking one: it
/// gets its own session (or process group, on windows) and no
/// controlling terminal.
pub fn detach(cmd: &mut Command) -> &mut Command {
    os::detach(cmd)
}

/// Queries the process table for `pid`. Errors are inconclusive
/// answers (e.g. permission denied), not evidence either way.
pub fn presence(pid: ProcessId) -> anyhow::Result<Presence> {
    os::presence(pid)
}

/// Looks `pid` up in the process table. A process that exited but
/// wasn't reaped by its parent yet still has an entry; it counts as gone.
fn process_table(pid: ProcessId) -> Presence {
    let sysinfo_pid = Pid::from_u32(pid.as_raw());
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[sysinfo_pid]),
        true,
        ProcessRefreshKind::new(),
    );
    match system.process(sysinfo_pid).map(|p| p.status()) {
        None | Some(ProcessStatus::Zombie) | Some(ProcessStatus::Dead) => Presence::Gone,
        Some(_) => Presence::Running,
    }
}

/// Requests a graceful termination of `pid`. When `group` is set, the
/// whole process group led by `pid` is signalled, if there is one.
pub fn terminate(pid: ProcessId, group: bool) -> Delivery {
    os::terminate(pid, group)
}
