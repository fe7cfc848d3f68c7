use anyhow::{Context, Result};
use hintergrund::liveness::Status;
use hintergrund::terminator::StopOutcome;
use hintergrund::*;
use slog::{o, Drain, Logger};
use slog_json::Json;
use slog_logfmt::Logfmt;
use slog_scope::info;
use std::io;
use std::{env::current_dir, path::Path, path::PathBuf};
use structopt::StructOpt;

fn setup_logger(config: &configuration::Config) -> Logger {
    use configuration::LogFormat;
    use configuration::LogOutput::*;

    let output: Box<dyn io::Write + Send + Sync> = match config.log.output {
        Stderr => Box::new(io::stderr()),
        Stdout => Box::new(io::stdout()),
    };
    match config.log.format {
        LogFormat::Json => {
            let drain = Json::new(output)
                .add_default_keys()
                .build()
                .filter_level(config.log.level.into())
                .fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("logger" => "hintergrund"))
        }
        LogFormat::Logfmt { print_prefix } => {
            let mut builder = Logfmt::new(output);
            if !print_prefix {
                builder = builder.no_prefix().print_msg(true);
            }
            let drain = builder.build().filter_level(config.log.level.into()).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("logger" => "hintergrund"))
        }
    }
}

/// Sets up a python venv and keeps a server running in the background.
#[derive(StructOpt, Debug)]
#[structopt(name = "hintergrund")]
struct Opt {
    /// Path to the configuration file to use for the service. Relative
    /// paths in it are resolved against its directory.
    #[structopt(short = "f", long, default_value = "./hintergrund.toml")]
    config_file: PathBuf,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(StructOpt, Debug)]
enum Cmd {
    /// Creates the venv, unless it exists already.
    SetupVenv,

    /// Installs the requirements into the venv, creating it if needed.
    Install,

    /// Deletes the venv and sets it up again from scratch.
    RebuildVenv,

    /// Starts the server detached in the background.
    Start {
        /// Return right after launching, without waiting for the server
        /// to accept connections.
        #[structopt(long)]
        no_wait: bool,

        /// Don't install dependencies before launching.
        #[structopt(long)]
        skip_install: bool,
    },

    /// Waits until the server accepts connections.
    Wait,

    /// Reports whether the recorded server is running. Exits with 1
    /// unless it is.
    Status,

    /// Asks the recorded server to terminate and forgets its PID.
    Stop,
}

fn load_settings(config_file: &Path) -> Result<configuration::Config> {
    let mut settings = config::Config::default();
    let base_dir = if config_file.exists() {
        let config_file = config_file.canonicalize()?;
        settings.merge(config::File::from(config_file.as_path()))?;
        config_file.parent().map(|p| p.to_owned())
    } else {
        None
    };
    settings.merge(config::Environment::with_prefix("HINTERGRUND").separator("__"))?;
    let mut settings = settings
        .try_into::<configuration::Config>()
        .context(format!(
            "Could not parse configuration file {:?}",
            config_file
        ))?;
    settings.base_dir = match base_dir {
        Some(dir) => dir,
        None => current_dir()?,
    };
    Ok(settings)
}

fn run(cmd: Cmd, settings: configuration::Config) -> Result<i32> {
    let _g = slog_scope::set_global_logger(
        slog_scope::logger().new(o!("service" => settings.supervisor.name.to_string())),
    );
    let supervisor = Supervisor::new(settings);

    match cmd {
        Cmd::SetupVenv => supervisor.setup_venv()?,
        Cmd::Install => supervisor.install()?,
        Cmd::RebuildVenv => supervisor.rebuild_venv()?,
        Cmd::Start {
            no_wait,
            skip_install,
        } => {
            let pid = supervisor.start(StartOptions {
                install: !skip_install,
                wait: !no_wait,
            })?;
            println!("Server started detached (PID={})", pid);
        }
        Cmd::Wait => {
            let ready = supervisor.wait()?;
            println!(
                "Server is accepting connections (after {} attempts)",
                ready.attempts
            );
        }
        Cmd::Status => {
            let status = supervisor.status()?;
            println!("{}", status);
            if !matches!(status, Status::Alive(_)) {
                return Ok(1);
            }
        }
        Cmd::Stop => match supervisor.stop()? {
            StopOutcome::NothingToStop => println!("No PID file. Nothing to stop."),
            StopOutcome::Signalled { pid, delivery } => {
                println!("Sent stop signal to PID={} ({})", pid, delivery)
            }
        },
    }
    Ok(0)
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let settings = load_settings(&opt.config_file)?;
    let log = setup_logger(&settings);
    let code = {
        let _guard = slog_scope::set_global_logger(log);
        info!("startup"; "command" => ?opt.cmd);
        run(opt.cmd, settings)?
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
