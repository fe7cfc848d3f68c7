//! Provisions a python venv and supervises a single background server
//! process across invocations.
//!
//! Each invocation of hintergrund is short-lived: `start` spawns the
//! server detached from itself, records its PID in a file and (usually)
//! waits for it to accept TCP connections, then exits. Later `status`
//! and `stop` invocations find the server again through that PID file
//! alone; no process handle survives between them.

pub mod configuration;
pub mod launcher;
pub mod liveness;
pub mod pidfile;
pub mod process;
pub mod readiness;
pub mod supervisor;
pub mod terminator;
pub mod venv;

pub use supervisor::{StartOptions, Supervisor};
