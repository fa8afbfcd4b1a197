use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;

use quickcollider_osc::ServerConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Deserialize, Default)]
struct ServerSection {
    host: Option<String>,
    recv_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    max_invoke_args: Option<usize>,
}

#[derive(Deserialize, Default)]
struct LogSection {
    level: Option<String>,
    file: Option<bool>,
}

pub struct Config {
    server: ServerSection,
    log: LogSection,
}

impl Config {
    /// Load the embedded defaults overlaid with the user's config file.
    ///
    /// Logging is not up yet when this runs, so problems are returned for the
    /// caller to report.
    pub fn load() -> (Self, Vec<String>) {
        Self::from_sources(DEFAULT_CONFIG, user_config_path().as_deref())
    }

    pub(crate) fn from_sources(defaults: &str, user_path: Option<&Path>) -> (Self, Vec<String>) {
        let mut problems = Vec::new();
        let mut base: ConfigFile = match toml::from_str(defaults) {
            Ok(base) => base,
            Err(e) => {
                problems.push(format!("embedded config.toml is malformed: {}", e));
                ConfigFile::default()
            }
        };

        if let Some(path) = user_path.filter(|p| p.exists()) {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                    Ok(user) => {
                        merge_server(&mut base.server, user.server);
                        merge_log(&mut base.log, user.log);
                    }
                    Err(e) => {
                        problems.push(format!("ignoring malformed config {}: {}", path.display(), e))
                    }
                },
                Err(e) => problems.push(format!("could not read config {}: {}", path.display(), e)),
            }
        }

        (
            Config {
                server: base.server,
                log: base.log,
            },
            problems,
        )
    }

    pub fn host(&self) -> &str {
        self.server.host.as_deref().unwrap_or("0.0.0.0")
    }

    /// Pause between processing passes (clamped to 1..1000 ms).
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.server.poll_interval_ms.unwrap_or(5).clamp(1, 1000))
    }

    pub fn server_config(&self) -> ServerConfig {
        let fallback = ServerConfig::default();
        ServerConfig {
            recv_timeout: self
                .server
                .recv_timeout_ms
                .map(|ms| Duration::from_millis(ms.clamp(1, 1000)))
                .unwrap_or(fallback.recv_timeout),
            max_invoke_args: self
                .server
                .max_invoke_args
                .unwrap_or(fallback.max_invoke_args),
        }
    }

    /// Unrecognised level names fall back to `Info`.
    pub fn log_level(&self) -> LevelFilter {
        self.log
            .level
            .as_deref()
            .and_then(|l| LevelFilter::from_str(l).ok())
            .unwrap_or(LevelFilter::Info)
    }

    pub fn log_to_file(&self) -> bool {
        self.log.file.unwrap_or(true)
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quickcollider")
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("quickcollider").join("config.toml"))
}

fn merge_server(base: &mut ServerSection, user: ServerSection) {
    if user.host.is_some() {
        base.host = user.host;
    }
    if user.recv_timeout_ms.is_some() {
        base.recv_timeout_ms = user.recv_timeout_ms;
    }
    if user.poll_interval_ms.is_some() {
        base.poll_interval_ms = user.poll_interval_ms;
    }
    if user.max_invoke_args.is_some() {
        base.max_invoke_args = user.max_invoke_args;
    }
}

fn merge_log(base: &mut LogSection, user: LogSection) {
    if user.level.is_some() {
        base.level = user.level;
    }
    if user.file.is_some() {
        base.file = user.file;
    }
}
