//! The commands hintergrund offers, wired up from the configuration.

use crate::configuration::Config;
use crate::launcher::Launcher;
use crate::liveness::{self, Status};
use crate::pidfile::PidFile;
use crate::process::ProcessId;
use crate::readiness::{self, Ready};
use crate::terminator::{self, StopOutcome};
use crate::venv::{MissingInterpreter, Venv};
use anyhow::{Context, Result};
use slog_scope::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("server script {0:?} does not exist")]
pub struct MissingScript(pub PathBuf);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOptions {
    /// Install the venv's dependencies before launching.
    pub install: bool,

    /// Block until the server accepts connections.
    pub wait: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        StartOptions {
            install: true,
            wait: true,
        }
    }
}

pub struct Supervisor {
    settings: Config,
    pidfile: PidFile,
    venv: Venv,
    launcher: Launcher,
}

impl Supervisor {
    pub fn new(settings: Config) -> Self {
        let pidfile = PidFile::new(settings.pid_file());
        let venv = Venv::new(
            settings.venv.python.clone(),
            settings.project_dir(),
            settings.venv_dir(),
        );
        let launcher = Launcher::new(
            settings.supervisor.name.clone(),
            settings.state_dir(),
            pidfile.clone(),
        );
        Supervisor {
            settings,
            pidfile,
            venv,
            launcher,
        }
    }

    pub fn pidfile(&self) -> &PidFile {
        &self.pidfile
    }

    pub fn setup_venv(&self) -> Result<()> {
        self.venv.setup().context("Could not set up the venv")?;
        Ok(())
    }

    pub fn install(&self) -> Result<()> {
        self.venv
            .install(&self.settings.requirements())
            .context("Could not install dependencies")
    }

    pub fn rebuild_venv(&self) -> Result<()> {
        self.venv
            .rebuild(&self.settings.requirements())
            .context("Could not rebuild the venv")
    }

    /// Launches the server script with the venv's interpreter and, if
    /// requested, waits for it to accept connections.
    ///
    /// A server that doesn't become ready in time is reported as an
    /// error, but keeps running and stays recorded.
    pub fn start(&self, options: StartOptions) -> Result<ProcessId> {
        if options.install {
            self.install()?;
        }
        let interpreter = self.venv.interpreter();
        if !interpreter.exists() {
            return Err(MissingInterpreter(interpreter).into());
        }
        let script = self.settings.server_script();
        if !script.exists() {
            return Err(MissingScript(script).into());
        }

        if let Status::Alive(pid) = self.status()? {
            warn!("a server is already running and will no longer be tracked"; "pid" => pid.as_raw());
        }

        let mut args = vec![script.to_string_lossy().into_owned()];
        args.extend(self.settings.server.args.iter().cloned());
        let pid = self.launcher.launch(
            &interpreter,
            &self.settings.server_cwd(),
            &args,
            &self.settings.server.env_vars(),
        )?;

        if options.wait {
            self.wait()
                .with_context(|| format!("Server with PID {} is not ready", pid))?;
        }
        Ok(pid)
    }

    pub fn wait(&self) -> Result<Ready> {
        let readiness = &self.settings.readiness;
        info!("waiting for server"; "host" => &readiness.host, "port" => readiness.port);
        readiness::wait_until_ready(&readiness.host, readiness.port, readiness.policy())
    }

    pub fn status(&self) -> Result<Status> {
        liveness::status(&self.pidfile)
    }

    pub fn stop(&self) -> Result<StopOutcome> {
        terminator::stop(&self.pidfile, self.settings.supervisor.signal_group)
    }
}
