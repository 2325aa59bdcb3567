use super::ConfigError;
use crate::broker::BrokerClient;
use crate::collaborators::ConfigStore;
use crate::filter::FilterDefinition;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk filter set:
/// `{"filters": [FilterDefinition..], "subscriptions": {"<service>": ["<filter>", ..]}}`
#[derive(Debug, Default, Deserialize)]
pub struct FilterFile {
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub subscriptions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub filters: usize,
    pub subscriptions: usize,
    pub rejected: usize,
}

pub struct FilterLoader;

impl FilterLoader {
    pub async fn read(path: &Path) -> Result<Option<FilterFile>, ConfigError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Pushes the filters and subscriptions of `path` into the broker.
    /// Individual filters or subscriptions the broker refuses are logged and
    /// skipped; a missing file means no filters.
    pub async fn load_into(
        path: &Path,
        broker: &BrokerClient,
        store: &dyn ConfigStore,
    ) -> Result<LoadReport, ConfigError> {
        let Some(file) = Self::read(path).await? else {
            tracing::warn!("No filters file at {}; starting without filters", path.display());
            return Ok(LoadReport::default());
        };

        let mut report = LoadReport::default();
        for filter in file.filters {
            let name = filter.name.clone();
            match broker.add_filter(filter).await {
                Ok(()) => report.filters += 1,
                Err(e) => {
                    tracing::error!("Skipping filter {}: {}", name, e);
                    report.rejected += 1;
                }
            }
        }

        for (service_name, filters) in file.subscriptions {
            let service = match store.get_service(&service_name).await {
                Ok(Some(service)) => service,
                Ok(None) => {
                    tracing::warn!("Subscriptions for unknown service {} ignored", service_name);
                    report.rejected += filters.len();
                    continue;
                }
                Err(e) => {
                    tracing::error!("Cannot resolve service {}: {}", service_name, e);
                    report.rejected += filters.len();
                    continue;
                }
            };
            for filter in filters {
                match broker.subscribe(service.clone(), &filter).await {
                    Ok(()) => report.subscriptions += 1,
                    Err(e) => {
                        tracing::error!("Cannot subscribe {} to {}: {}", service_name, filter, e);
                        report.rejected += 1;
                    }
                }
            }
        }

        tracing::info!(
            "✅ Loaded {} filters and {} subscriptions ({} rejected)",
            report.filters,
            report.subscriptions,
            report.rejected
        );
        Ok(report)
    }
}
