use crate::pidfile::PidFile;
use crate::process::{self, ProcessId};
use anyhow::{Context, Result};
use slog_scope::info;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Set in the server's environment unless the caller sets it: python
/// otherwise block-buffers output that is redirected to a file.
pub const UNBUFFERED_ENV: &str = "PYTHONUNBUFFERED";

#[derive(Error, Debug, PartialEq)]
#[error("executable {0:?} does not exist")]
pub struct MissingExecutable(pub PathBuf);

/// Starts a server process detached from the current one, with its
/// output going into `<logs_dir>/<name>.out` and `<logs_dir>/<name>.err`.
#[derive(Debug, Clone)]
pub struct Launcher {
    name: String,
    logs_dir: PathBuf,
    pidfile: PidFile,
}

impl Launcher {
    pub fn new(name: impl Into<String>, logs_dir: impl Into<PathBuf>, pidfile: PidFile) -> Self {
        Launcher {
            name: name.into(),
            logs_dir: logs_dir.into(),
            pidfile,
        }
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.logs_dir.join(format!("{}.out", self.name))
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.logs_dir.join(format!("{}.err", self.name))
    }

    /// Spawns `executable` with `args` in `cwd` and records its PID. A
    /// relative `executable` is resolved against `cwd`, never `$PATH`.
    ///
    /// The process is only guaranteed to have existed at the moment it
    /// was spawned; it may well have crashed by the time this returns.
    pub fn launch(
        &self,
        executable: &Path,
        cwd: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ProcessId> {
        let executable = if executable.is_absolute() {
            executable.to_path_buf()
        } else {
            cwd.join(executable)
        };
        if !executable.exists() {
            return Err(MissingExecutable(executable).into());
        }
        // The child changes into `cwd` before exec, so a relative `cwd`
        // has to be anchored here. Not canonicalized: a venv's
        // interpreter is a symlink that must run under its own name.
        let executable = if executable.is_relative() {
            std::env::current_dir()
                .context("Could not determine the current directory")?
                .join(executable)
        } else {
            executable
        };

        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("Could not create log directory {:?}", &self.logs_dir))?;
        let stdout = create_log(&self.stdout_log())?;
        let stderr = create_log(&self.stderr_log())?;

        let mut cmd = Command::new(&executable);
        cmd.args(args)
            .current_dir(cwd)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        if !env.contains_key(UNBUFFERED_ENV) {
            cmd.env(UNBUFFERED_ENV, "1");
        }
        process::detach(&mut cmd);

        let child = cmd
            .spawn()
            .with_context(|| format!("Could not spawn {:?} in {:?}", executable, cwd))?;
        // Child::id is never 0 for a process that was just spawned.
        let pid = ProcessId::new(child.id())
            .with_context(|| format!("{:?} was spawned without a process ID", executable))?;
        // Dropping the Child neither waits for nor kills the process.
        drop(child);

        // The server is running now whether or not we manage to record it.
        self.pidfile
            .write(pid)
            .with_context(|| format!("Started PID {} but could not record it", pid))?;
        info!("started detached";
              "pid" => pid.as_raw(),
              "executable" => ?executable,
              "stdout" => ?self.stdout_log(),
              "stderr" => ?self.stderr_log(),
        );
        Ok(pid)
    }
}

fn create_log(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Could not create log file {:?}", path))
}
