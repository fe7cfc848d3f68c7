use super::{process_table, Delivery, Presence, ProcessId};
use anyhow::Result;
use std::os::windows::process::CommandExt;
use std::process::{Command, Stdio};

const DETACHED_PROCESS: u32 = 0x0000_0008;
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub(super) fn detach(cmd: &mut Command) -> &mut Command {
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
}

pub(super) fn presence(pid: ProcessId) -> Result<Presence> {
    Ok(process_table(pid))
}

/// Windows has no graceful equivalent for a detached console process,
/// so this is a forceful tree kill.
pub(super) fn terminate(pid: ProcessId, _group: bool) -> Delivery {
    let output = Command::new("taskkill")
        .args(&["/T", "/F", "/PID"])
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .output();
    match output {
        Ok(out) if out.status.success() => Delivery::Delivered,
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("not found") {
                Delivery::NoSuchProcess
            } else if stderr.contains("Access is denied") {
                Delivery::PermissionDenied
            } else {
                Delivery::Failed(stderr.trim().to_string())
            }
        }
        Err(e) => Delivery::Failed(e.to_string()),
    }
}
