pub mod loader;

use crate::constants;
use crate::relay::RelaySettings;
use crate::service_manager::{ManagerSettings, RestartPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const PREFIX: &str = "CTF_PROXY_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {detail}")]
    Invalid {
        key: String,
        value: String,
        detail: String,
    },

    #[error("cannot read filters file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed filters file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime settings, read from `CTF_PROXY_*` environment variables (and a
/// `.env` file if present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_host: String,
    pub bind_host: String,
    pub config_path: PathBuf,
    pub filters_path: PathBuf,
    pub broker_socket: PathBuf,
    pub broker_timeout: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_connections: usize,
    pub max_message_bytes: usize,
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub log_dir: PathBuf,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_host: constants::network::BACKEND_HOST.to_string(),
            bind_host: constants::network::BIND_HOST.to_string(),
            config_path: constants::paths::CONFIG_PATH.into(),
            filters_path: constants::paths::FILTERS_PATH.into(),
            broker_socket: constants::broker::SOCKET_PATH.into(),
            broker_timeout: Duration::from_millis(constants::timeout::BROKER_MS),
            connect_timeout: Duration::from_millis(constants::timeout::CONNECT_MS),
            idle_timeout: Duration::from_secs(constants::timeout::IDLE_SECS),
            max_connections: constants::supervisor::MAX_CONNECTIONS,
            max_message_bytes: constants::framing::MAX_MESSAGE_BYTES,
            max_restarts: constants::supervisor::MAX_RESTARTS,
            restart_delay: Duration::from_millis(constants::supervisor::RESTART_DELAY_MS),
            log_dir: constants::paths::LOG_DIR.into(),
            metrics_addr: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env is fine
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut s = Self::default();

        if let Some(v) = var("BACKEND_HOST") {
            s.backend_host = v;
        }
        if let Some(v) = var("BIND_HOST") {
            s.bind_host = v;
        }
        if let Some(v) = var("CONFIG_PATH") {
            s.config_path = v.into();
        }
        if let Some(v) = var("FILTERS_PATH") {
            s.filters_path = v.into();
        }
        if let Some(v) = var("BROKER_SOCKET") {
            s.broker_socket = v.into();
        }
        if let Some(v) = var("LOG_DIR") {
            s.log_dir = v.into();
        }
        if let Some(v) = var("BROKER_TIMEOUT_MS") {
            s.broker_timeout = Duration::from_millis(positive("BROKER_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = var("CONNECT_TIMEOUT_MS") {
            s.connect_timeout = Duration::from_millis(positive("CONNECT_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = var("IDLE_TIMEOUT_SECS") {
            s.idle_timeout = Duration::from_secs(positive("IDLE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("MAX_CONNECTIONS") {
            s.max_connections = positive("MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = var("MAX_MESSAGE_BYTES") {
            s.max_message_bytes = positive("MAX_MESSAGE_BYTES", &v)?;
        }
        if let Some(v) = var("MAX_RESTARTS") {
            s.max_restarts = parse("MAX_RESTARTS", &v)?;
        }
        if let Some(v) = var("RESTART_DELAY_MS") {
            s.restart_delay = Duration::from_millis(parse("RESTART_DELAY_MS", &v)?);
        }
        if let Some(v) = var("METRICS_ADDR") {
            s.metrics_addr = Some(parse("METRICS_ADDR", &v)?);
        }

        Ok(s)
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            backend_host: self.backend_host.clone(),
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
            max_message_bytes: self.max_message_bytes,
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            bind_host: self.bind_host.clone(),
            relay: Arc::new(self.relay_settings()),
            max_connections: self.max_connections,
            restart: RestartPolicy {
                max_restarts: self.max_restarts,
                delay: self.restart_delay,
            },
            shutdown_grace: Duration::from_millis(constants::timeout::SHUTDOWN_GRACE_MS),
        }
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: format!("{}{}", PREFIX, name),
        value: value.to_string(),
        detail: e.to_string(),
    })
}

fn positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse(name, value)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            key: format!("{}{}", PREFIX, name),
            value: value.to_string(),
            detail: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
