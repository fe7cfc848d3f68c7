//! Provisioning the python virtual environment the server runs in.

use anyhow::{Context, Result};
use slog_scope::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("{0:?} does not exist; set up the venv first")]
pub struct MissingInterpreter(pub PathBuf);

#[derive(Error, Debug, PartialEq)]
#[error("requirements file {0:?} does not exist")]
pub struct MissingManifest(pub PathBuf);

#[derive(Error, Debug, PartialEq)]
#[error("`{cmdline}` exited with {status}")]
pub struct CommandFailed {
    pub cmdline: String,
    pub status: ExitStatus,
}

/// A python venv at `dir`, created by `python` from inside `project_dir`.
#[derive(Debug, Clone)]
pub struct Venv {
    python: String,
    project_dir: PathBuf,
    dir: PathBuf,
}

impl Venv {
    pub fn new(python: impl Into<String>, project_dir: PathBuf, dir: PathBuf) -> Self {
        Venv {
            python: python.into(),
            project_dir,
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interpreter(&self) -> PathBuf {
        if cfg!(windows) {
            self.dir.join("Scripts").join("python.exe")
        } else {
            self.dir.join("bin").join("python")
        }
    }

    pub fn pip(&self) -> PathBuf {
        if cfg!(windows) {
            self.dir.join("Scripts").join("pip.exe")
        } else {
            self.dir.join("bin").join("pip")
        }
    }

    pub fn exists(&self) -> bool {
        self.interpreter().exists()
    }

    /// Creates the venv unless its interpreter is already there.
    /// Returns whether anything was created.
    pub fn setup(&self) -> Result<bool> {
        if self.exists() {
            info!("venv already exists"; "dir" => ?&self.dir);
            return Ok(false);
        }
        info!("setting up venv"; "dir" => ?&self.dir, "os" => std::env::consts::OS);
        let mut cmd = Command::new(&self.python);
        cmd.arg("-m").arg("venv").arg(&self.dir);
        run(cmd, &self.project_dir)?;
        Ok(true)
    }

    /// Installs the dependencies listed in `requirements` into the venv,
    /// creating the venv first if needed.
    pub fn install(&self, requirements: &Path) -> Result<()> {
        if !requirements.exists() {
            return Err(MissingManifest(requirements.to_path_buf()).into());
        }
        self.setup()?;
        let pip = self.pip();
        if !pip.exists() {
            return Err(MissingInterpreter(pip).into());
        }
        info!("installing dependencies"; "requirements" => ?requirements);
        let mut cmd = Command::new(&pip);
        cmd.arg("install").arg("-r").arg(requirements);
        run(cmd, &self.project_dir)
    }

    /// Deletes the venv entirely. Deleting one that isn't there is fine.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                info!("removed venv"; "dir" => ?&self.dir);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Could not remove venv {:?}", &self.dir)),
        }
    }

    /// Tears the venv down and sets it up from scratch.
    pub fn rebuild(&self, requirements: &Path) -> Result<()> {
        if !requirements.exists() {
            return Err(MissingManifest(requirements.to_path_buf()).into());
        }
        self.remove()?;
        self.install(requirements)
    }
}

/// Runs `cmd` in `dir` to completion, passing through its output.
fn run(mut cmd: Command, dir: &Path) -> Result<()> {
    let cmdline = format!("{:?}", cmd);
    info!("will run"; "cmdline" => &cmdline, "dir" => ?dir);
    let status = cmd
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("running `{}`", cmdline))?;
    if !status.success() {
        return Err(CommandFailed { cmdline, status }.into());
    }
    Ok(())
}
