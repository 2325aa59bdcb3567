use crate::broker::BrokerError;
use crate::collaborators::StoreError;
use crate::config::ConfigError;
use crate::service_manager::ServiceError;
use thiserror::Error;

/// Top-level error for the proxy binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Config store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Metrics error: {0}")]
    Metrics(String),
}
