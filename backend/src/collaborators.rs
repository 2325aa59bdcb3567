//! Interfaces to the pieces around the proxy core: where services are
//! declared, who publishes the edge configuration, and who opens ports on
//! the host firewall. Only the JSON config store is implemented here.

use crate::service::{ProtocolType, Service};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    #[error("service '{0}' not found in configuration")]
    UnknownService(String),

    #[error("service '{name}' or port {port} is already configured")]
    Conflict { name: String, port: u16 },
}

/// Collaborator failures are opaque to the core; they only get logged.
pub type CollaboratorResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_service(&self, name: &str) -> Result<Option<Service>, StoreError>;
    async fn list_services(&self) -> Result<Vec<Service>, StoreError>;
}

/// Pushes the set of exposed services to whatever fronts them.
#[async_trait]
pub trait EdgeConfigPublisher: Send + Sync {
    async fn publish(&self, services: &[Service]) -> CollaboratorResult<()>;
}

/// Host-level NAT from the public service port to the proxy listener.
#[async_trait]
pub trait PortRedirector: Send + Sync {
    async fn expose(&self, service_port: u16, target_port: u16) -> CollaboratorResult<()>;
    async fn revoke(&self, service_port: u16, target_port: u16) -> CollaboratorResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceRecord {
    port: u16,
    #[serde(rename = "type")]
    protocol_type: ProtocolType,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// `{"services": {"<name>": {"port": .., "type": "tcp"|"http"|"https", "active": ..}}}`
///
/// Every call reads the file again so edits made by other tools are picked
/// up. Keys this store does not know about are preserved on write.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Value, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let doc: Value = serde_json::from_str(&raw).map_err(|e| self.malformed(e))?;
        if !doc.is_object() {
            return Err(self.malformed("top level must be an object"));
        }
        Ok(doc)
    }

    async fn save(&self, doc: &Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(doc).map_err(|e| self.malformed(e))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn malformed(&self, detail: impl ToString) -> StoreError {
        StoreError::Malformed {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn services(&self, doc: &Value) -> Result<Vec<Service>, StoreError> {
        let Some(map) = doc.get("services") else {
            return Ok(Vec::new());
        };
        let map = map
            .as_object()
            .ok_or_else(|| self.malformed("'services' must be an object"))?;

        let mut services = Vec::with_capacity(map.len());
        for (name, value) in map {
            let record: ServiceRecord = serde_json::from_value(value.clone())
                .map_err(|e| self.malformed(format!("service '{}': {}", name, e)))?;
            services.push(Service {
                name: name.clone(),
                port: record.port,
                protocol_type: record.protocol_type,
                active: record.active,
            });
        }
        Ok(services)
    }

    fn services_mut<'a>(&self, doc: &'a mut Value) -> Result<&'a mut Map<String, Value>, StoreError> {
        let root = doc
            .as_object_mut()
            .ok_or_else(|| self.malformed("top level must be an object"))?;
        root.entry("services")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| self.malformed("'services' must be an object"))
    }

    /// A service can be added when neither its name nor its port is taken.
    pub async fn can_add(&self, service: &Service) -> Result<bool, StoreError> {
        let doc = self.load().await?;
        Ok(!self
            .services(&doc)?
            .iter()
            .any(|s| s.name == service.name || s.port == service.port))
    }

    /// Inserts or replaces the entry for `service.name`.
    pub async fn store_service(&self, service: &Service) -> Result<(), StoreError> {
        let mut doc = self.load().await?;
        let clash = self
            .services(&doc)?
            .into_iter()
            .any(|s| s.name != service.name && s.port == service.port);
        if clash {
            return Err(StoreError::Conflict {
                name: service.name.clone(),
                port: service.port,
            });
        }

        let record = ServiceRecord {
            port: service.port,
            protocol_type: service.protocol_type,
            active: service.active,
        };
        let value = serde_json::to_value(record).map_err(|e| self.malformed(e))?;
        self.services_mut(&mut doc)?
            .insert(service.name.clone(), value);
        self.save(&doc).await
    }

    pub async fn remove_service(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.load().await?;
        if self.services_mut(&mut doc)?.remove(name).is_none() {
            return Err(StoreError::UnknownService(name.to_string()));
        }
        self.save(&doc).await
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn get_service(&self, name: &str) -> Result<Option<Service>, StoreError> {
        let doc = self.load().await?;
        Ok(self.services(&doc)?.into_iter().find(|s| s.name == name))
    }

    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let doc = self.load().await?;
        self.services(&doc)
    }
}
