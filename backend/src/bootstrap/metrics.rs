use crate::error::AppError;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Installs the Prometheus recorder. With an address, the exporter also serves
/// `/metrics` there; without one the counters are recorded but not exposed.
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<(), AppError> {
    match listen {
        Some(addr) => {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| AppError::Metrics(e.to_string()))?;
            tracing::info!("📈 Metrics exporter listening on {}", addr);
        }
        None => {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| AppError::Metrics(e.to_string()))?;
        }
    }
    Ok(())
}
