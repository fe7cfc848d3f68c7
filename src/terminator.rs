use crate::pidfile::PidFile;
use crate::process::{self, Delivery, ProcessId};
use anyhow::Result;
use slog_scope::{info, warn};

#[derive(Debug, PartialEq)]
pub enum StopOutcome {
    /// There was no PID file; nothing was signalled.
    NothingToStop,

    /// A termination request was sent (or attempted) and the record
    /// was cleared.
    Signalled { pid: ProcessId, delivery: Delivery },
}

/// Asks the recorded process to terminate, then forgets about it.
///
/// The record is removed even when the signal could not be delivered,
/// so a stale PID never blocks the next launch. The flip side: a
/// process that is alive but refuses our signal (e.g. it belongs to
/// another user) is no longer tracked afterwards, and has to be dealt
/// with by hand. There is no check that the process actually exits, and
/// no escalation to a forced kill.
pub fn stop(pidfile: &PidFile, signal_group: bool) -> Result<StopOutcome> {
    let pid = match pidfile.read()? {
        None => {
            info!("no PID file, nothing to stop"; "path" => ?pidfile.path());
            // Gets rid of unparseable leftovers; a no-op otherwise.
            pidfile.clear()?;
            return Ok(StopOutcome::NothingToStop);
        }
        Some(pid) => pid,
    };

    let delivery = process::terminate(pid, signal_group);
    match &delivery {
        Delivery::Delivered => info!("sent stop signal"; "pid" => pid.as_raw()),
        other => warn!("could not deliver stop signal"; "pid" => pid.as_raw(), "outcome" => %other),
    }

    pidfile.clear()?;
    Ok(StopOutcome::Signalled { pid, delivery })
}
