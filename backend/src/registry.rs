//! In-memory filter table. Not synchronized on its own: the broker task is
//! its only owner.

use crate::filter::FilterDefinition;
use crate::service::Service;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryError {
    #[error("filter '{0}' already exists")]
    DuplicateName(String),

    #[error("filter '{name}' must take exactly two parameters (message, context), found {found}")]
    InvalidArity { name: String, found: usize },

    #[error("filter '{name}' has an invalid rule: {detail}")]
    InvalidRule { name: String, detail: String },

    #[error("filter '{0}' not found")]
    NotFound(String),

    #[error("service '{service}' is not subscribed to filter '{filter}'")]
    SubscriptionNotFound { filter: String, service: String },
}

#[derive(Debug, Clone)]
struct FilterEntry {
    definition: FilterDefinition,
    /// Append-only list: subscribing twice stores the service twice.
    subscribers: Vec<Service>,
}

impl FilterEntry {
    fn is_subscriber(&self, service: &Service) -> bool {
        self.subscribers.iter().any(|s| s == service)
    }
}

/// Filters in registration order together with their subscribers.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    entries: Vec<FilterEntry>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Result<&FilterEntry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.definition.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut FilterEntry, RegistryError> {
        self.entries
            .iter_mut()
            .find(|e| e.definition.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registers a filter. The name is taken from the definition.
    pub fn add(&mut self, definition: FilterDefinition) -> Result<(), RegistryError> {
        if self.exists(&definition.name) {
            return Err(RegistryError::DuplicateName(definition.name));
        }
        definition.validate()?;
        self.entries.push(FilterEntry {
            definition,
            subscribers: Vec::new(),
        });
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<FilterDefinition, RegistryError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.definition.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(idx).definition)
    }

    pub fn get(&self, name: &str) -> Result<&FilterDefinition, RegistryError> {
        self.entry(name).map(|e| &e.definition)
    }

    pub fn subscribe(&mut self, service: Service, filter: &str) -> Result<(), RegistryError> {
        self.entry_mut(filter)?.subscribers.push(service);
        Ok(())
    }

    /// Removes a single subscription entry.
    pub fn unsubscribe(&mut self, service: &Service, filter: &str) -> Result<(), RegistryError> {
        let entry = self.entry_mut(filter)?;
        let idx = entry
            .subscribers
            .iter()
            .position(|s| s == service)
            .ok_or_else(|| RegistryError::SubscriptionNotFound {
                filter: filter.to_string(),
                service: service.name.clone(),
            })?;
        entry.subscribers.remove(idx);
        Ok(())
    }

    /// Drops every subscription of `service`, duplicates included.
    pub fn unsubscribe_all(&mut self, service: &Service) {
        for entry in &mut self.entries {
            entry.subscribers.retain(|s| s != service);
        }
    }

    /// Filters `service` is subscribed to, each listed once, in registration order.
    pub fn subscribed_filters(&self, service: &Service) -> Vec<FilterDefinition> {
        self.entries
            .iter()
            .filter(|e| e.is_subscriber(service))
            .map(|e| e.definition.clone())
            .collect()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.definition.name.clone())
            .collect()
    }

    pub fn subscriber_count(&self, name: &str) -> Result<usize, RegistryError> {
        self.entry(name).map(|e| e.subscribers.len())
    }

    /// Unknown filters report `false` rather than an error.
    pub fn is_subscribed(&self, service: &Service, name: &str) -> bool {
        self.entry(name)
            .map(|e| e.is_subscriber(service))
            .unwrap_or(false)
    }

    /// Every service with at least one subscription, deduplicated.
    pub fn all_subscribed_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = Vec::new();
        for entry in &self.entries {
            for s in &entry.subscribers {
                if !services.contains(s) {
                    services.push(s.clone());
                }
            }
        }
        services
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.definition.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
