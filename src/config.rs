use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::board_controller::DEFAULT_INIT_TIMEOUT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// URL prefix the app is mounted under, either empty or `/prefix`.
    pub base_path: String,
    pub init_timeout: Duration,
    pub session_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            db_path: PathBuf::from("taskboard.db"),
            base_path: String::new(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            session_days: 7,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = lookup("TASKBOARD_PORT").ok_or(ConfigError::Missing("TASKBOARD_PORT"))?;
        let port = parse("TASKBOARD_PORT", port)?;

        let db_path = lookup("TASKBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let base_path = lookup("TASKBOARD_BASE_PATH")
            .map(|path| normalize_base_path(&path))
            .unwrap_or_default();

        let init_timeout = match lookup("TASKBOARD_INIT_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse("TASKBOARD_INIT_TIMEOUT_MS", ms)?),
            None => defaults.init_timeout,
        };

        let session_days = match lookup("TASKBOARD_SESSION_DAYS") {
            Some(days) => parse("TASKBOARD_SESSION_DAYS", days)?,
            None => defaults.session_days,
        };
        if session_days <= 0 {
            return Err(ConfigError::Invalid {
                name: "TASKBOARD_SESSION_DAYS",
                value: session_days.to_string(),
            });
        }

        Ok(Config {
            port,
            db_path,
            base_path,
            init_timeout,
            session_days,
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

pub fn normalize_base_path(path: &str) -> String {
    let path = path.trim().trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
