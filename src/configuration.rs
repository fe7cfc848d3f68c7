use crate::readiness::Policy;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub venv: VenvConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// The directory that relative paths in the configuration are
    /// resolved against. Set to the config file's directory at
    /// startup.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Resolves a (possibly relative) configured path against the
    /// configuration's base directory.
    pub fn canonical_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Directory holding the PID file and the server's log files.
    pub fn state_dir(&self) -> PathBuf {
        self.canonical_path(&self.supervisor.state_dir)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.state_dir()
            .join(format!("{}.pid", self.supervisor.name))
    }

    pub fn project_dir(&self) -> PathBuf {
        self.canonical_path(&self.venv.project_dir)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.project_dir().join(&self.venv.dir)
    }

    pub fn requirements(&self) -> PathBuf {
        self.project_dir().join(&self.venv.requirements)
    }

    /// The working directory the server runs in: the configured `cwd`,
    /// or the venv's project directory.
    pub fn server_cwd(&self) -> PathBuf {
        match &self.server.cwd {
            Some(cwd) => self.canonical_path(cwd),
            None => self.project_dir(),
        }
    }

    pub fn server_script(&self) -> PathBuf {
        self.server_cwd().join(&self.server.script)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SupervisorConfig {
    /// Name of the supervised service. Determines logging fields and
    /// the names of the PID and log files. Default: "flask"
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory for the PID file and the `<name>.out`/`<name>.err`
    /// logs. Default: "flask"
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Whether to signal the whole process group led by the server
    /// (it is started as a session leader) instead of just its PID.
    #[serde(default = "default_true")]
    pub signal_group: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            name: default_name(),
            state_dir: default_state_dir(),
            signal_group: true,
        }
    }
}

fn default_name() -> String {
    "flask".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("flask")
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VenvConfig {
    /// The base interpreter used to create the venv.
    #[serde(default = "default_python")]
    pub python: String,

    /// The python project's directory. Default: "src"
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// The venv's location, relative to the project directory.
    #[serde(default = "default_venv_dir")]
    pub dir: PathBuf,

    /// The pip requirements manifest, relative to the project directory.
    #[serde(default = "default_requirements")]
    pub requirements: PathBuf,
}

impl Default for VenvConfig {
    fn default() -> Self {
        VenvConfig {
            python: default_python(),
            project_dir: default_project_dir(),
            dir: default_venv_dir(),
            requirements: default_requirements(),
        }
    }
}

fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

fn default_project_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_venv_dir() -> PathBuf {
    PathBuf::from("venv")
}

fn default_requirements() -> PathBuf {
    PathBuf::from("requirements.txt")
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ServerConfig {
    /// The script the venv interpreter runs, relative to `cwd`.
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Additional arguments passed after the script.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables that should be set before the server
    /// spawns, as `NAME=value` strings. `PYTHONUNBUFFERED` defaults
    /// to "1" unless set here.
    #[serde(default)]
    pub env: Vec<EnvAssignment>,

    /// The directory to chdir into before running the server.
    pub cwd: Option<PathBuf>,
}

impl ServerConfig {
    pub fn env_vars(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            script: default_script(),
            args: vec![],
            env: vec![],
            cwd: None,
        }
    }
}

/// A single `NAME=value` environment assignment. Kept as a string
/// because configuration keys are case-folded, and environment
/// variable names must not be.
#[derive(Deserialize)]
#[serde(try_from = "String")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EnvAssignment {
    pub name: String,
    pub value: String,
}

impl TryFrom<String> for EnvAssignment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.find('=') {
            Some(0) | None => Err(format!("expected NAME=value, got {:?}", s)),
            Some(pos) => Ok(EnvAssignment {
                name: s[..pos].to_string(),
                value: s[pos + 1..].to_string(),
            }),
        }
    }
}

fn default_script() -> PathBuf {
    PathBuf::from("CAServer.py")
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long to wait for the server to accept connections in
    /// total. Default: 60s
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// How long to sleep between connection attempts. Default: 500ms
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl ReadinessConfig {
    pub fn policy(&self) -> Policy {
        Policy {
            interval: self.interval,
            deadline: self.timeout,
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        ReadinessConfig {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
            interval: default_interval(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_interval() -> Duration {
    Duration::from_millis(500)
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl Into<slog::Level> for LogLevel {
    fn into(self) -> slog::Level {
        match self {
            LogLevel::Critical => slog::Level::Critical,
            LogLevel::Error => slog::Level::Error,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Trace => slog::Level::Trace,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LogFormat {
    Json,
    Logfmt {
        /// Print the level and message as a prefix before the
        /// key-value pairs.
        #[serde(default)]
        print_prefix: bool,
    },
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Logfmt { print_prefix: true }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogOutput {
    Stderr,
    Stdout,
}

impl Default for LogOutput {
    fn default() -> Self {
        LogOutput::Stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::from_str(toml, config::FileFormat::Toml))
            .expect("merging");
        settings.try_into::<Config>().expect("parsing")
    }

    #[test]
    fn empty_file_has_reference_defaults() {
        let config = parse("");
        assert_eq!(config.supervisor.name, "flask");
        assert_eq!(config.readiness.host, "127.0.0.1");
        assert_eq!(config.readiness.port, 5000);
        assert_eq!(config.readiness.timeout, Duration::from_secs(60));
        assert_eq!(config.readiness.interval, Duration::from_millis(500));
        assert_eq!(config.server.script, PathBuf::from("CAServer.py"));
        assert!(config.supervisor.signal_group);
    }

    #[test]
    fn parses_durations_and_env() {
        let config = parse(
            r#"
[readiness]
port = 8080
timeout = "5s"
interval = "100ms"

[server]
script = "app.py"
args = ["--debug"]
env = ["PYTHONUNBUFFERED=0", "GREETING=a=b"]

[log]
level = "debug"
format = { type = "json" }
"#,
        );
        assert_eq!(config.readiness.port, 8080);
        assert_eq!(
            config.readiness.policy(),
            Policy {
                interval: Duration::from_millis(100),
                deadline: Duration::from_secs(5),
            }
        );
        assert_eq!(config.server.args, vec!["--debug".to_string()]);
        let env = config.server.env_vars();
        assert_eq!(env.get("PYTHONUNBUFFERED").map(String::as_str), Some("0"));
        assert_eq!(env.get("GREETING").map(String::as_str), Some("a=b"));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn rejects_malformed_env_assignments() {
        assert!(EnvAssignment::try_from("NOVALUE".to_string()).is_err());
        assert!(EnvAssignment::try_from("=x".to_string()).is_err());
        assert_eq!(
            EnvAssignment::try_from("EMPTY=".to_string()),
            Ok(EnvAssignment {
                name: "EMPTY".to_string(),
                value: "".to_string()
            })
        );
    }

    #[test]
    fn resolves_paths_against_base_dir() {
        let mut config = parse("");
        config.base_dir = PathBuf::from("/srv/app");
        assert_eq!(config.pid_file(), PathBuf::from("/srv/app/flask/flask.pid"));
        assert_eq!(config.venv_dir(), PathBuf::from("/srv/app/src/venv"));
        assert_eq!(
            config.server_script(),
            PathBuf::from("/srv/app/src/CAServer.py")
        );
        config.server.cwd = Some(PathBuf::from("/opt/server"));
        assert_eq!(
            config.server_script(),
            PathBuf::from("/opt/server/CAServer.py")
        );
    }
}
