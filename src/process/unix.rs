use super::{process_table, Delivery, Presence, ProcessId};
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{setsid, Pid};
use std::convert::TryFrom;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Converts to a nix Pid. IDs above i32::MAX can't be real processes,
/// and must never turn into negative (= process group) arguments.
fn nix_pid(pid: ProcessId) -> Option<Pid> {
    i32::try_from(pid.as_raw()).ok().map(Pid::from_raw)
}

pub(super) fn detach(cmd: &mut Command) -> &mut Command {
    unsafe {
        cmd.pre_exec(|| {
            setsid().map(|_| ()).map_err(|e| match e.as_errno() {
                Some(errno) => io::Error::from_raw_os_error(errno as i32),
                None => io::Error::new(io::ErrorKind::Other, e),
            })
        })
    }
}

/// Signal 0 tells "doesn't exist" apart from "not allowed to ask";
/// the process table then tells running processes from zombies.
pub(super) fn presence(pid: ProcessId) -> Result<Presence> {
    let nix_pid = match nix_pid(pid) {
        Some(p) => p,
        None => return Ok(Presence::Gone),
    };
    match kill(nix_pid, None) {
        Ok(()) => Ok(process_table(pid)),
        Err(nix::Error::Sys(Errno::ESRCH)) => Ok(Presence::Gone),
        Err(e) => Err(e).with_context(|| format!("Could not query process {}", pid)),
    }
}

fn delivery(result: nix::Result<()>) -> Delivery {
    match result {
        Ok(()) => Delivery::Delivered,
        Err(nix::Error::Sys(Errno::ESRCH)) => Delivery::NoSuchProcess,
        Err(nix::Error::Sys(Errno::EPERM)) => Delivery::PermissionDenied,
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

pub(super) fn terminate(pid: ProcessId, group: bool) -> Delivery {
    let nix_pid = match nix_pid(pid) {
        Some(p) => p,
        None => return Delivery::NoSuchProcess,
    };
    if group {
        match delivery(killpg(nix_pid, Signal::SIGTERM)) {
            // Not a group leader; fall through and signal the process itself.
            Delivery::NoSuchProcess => {}
            outcome => return outcome,
        }
    }
    delivery(kill(nix_pid, Signal::SIGTERM))
}
