use crate::broker::FilterSource;
use crate::relay::RelaySettings;
use crate::service::Service;
use crate::service_process::ServiceProcess;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("cannot bind port {port} for service '{service}': {source}")]
    Bind {
        service: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("service '{0}' is already running")]
    AlreadyRunning(String),

    #[error("port {port} is already used by running service '{owner}'")]
    PortInUse { port: u16, owner: String },

    #[error("service '{0}' is not active")]
    Inactive(String),
}

/// Snapshot of one live service.
#[derive(Debug, Clone, Serialize)]
pub struct RunningServiceEntry {
    pub service: Service,
    pub started_at: DateTime<Utc>,
    pub restarts: u32,
}

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub bind_host: String,
    pub relay: Arc<RelaySettings>,
    pub max_connections: usize,
    pub restart: RestartPolicy,
    /// How long `stop` waits for the accept loop before aborting it.
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    pub max_restarts: u32,
    pub delay: Duration,
}

struct RunningService {
    service: Service,
    started_at: DateTime<Utc>,
    restarts: Arc<AtomicU32>,
    generation: u64,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the table of running services. Each service runs as its own
/// supervised task; stopping one never touches the others.
#[derive(Clone)]
pub struct ServiceManager {
    settings: Arc<ManagerSettings>,
    filters: Arc<dyn FilterSource>,
    // Map service name -> running task
    running: Arc<Mutex<HashMap<String, RunningService>>>,
    generation: Arc<AtomicU64>,
}

impl ServiceManager {
    pub fn new(settings: ManagerSettings, filters: Arc<dyn FilterSource>) -> Self {
        Self {
            settings: Arc::new(settings),
            filters,
            running: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn check_free(&self, service: &Service) -> Result<(), ServiceError> {
        let running = self.running.lock();
        if running.contains_key(&service.name) {
            return Err(ServiceError::AlreadyRunning(service.name.clone()));
        }
        if let Some(owner) = running.values().find(|r| r.service.port == service.port) {
            return Err(ServiceError::PortInUse {
                port: service.port,
                owner: owner.service.name.clone(),
            });
        }
        Ok(())
    }

    /// Binds the service port and starts its supervised accept loop.
    pub async fn start(&self, service: Service) -> Result<(), ServiceError> {
        if !service.active {
            return Err(ServiceError::Inactive(service.name));
        }
        self.check_free(&service)?;

        let process = match ServiceProcess::bind(
            service.clone(),
            &self.settings.bind_host,
            self.settings.relay.clone(),
            self.filters.clone(),
            self.settings.max_connections,
        )
        .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("❌ Failed to start {}: {}", service.name, e);
                return Err(e);
            }
        };

        let mut running = self.running.lock();
        // Another start may have raced us while binding.
        if running.contains_key(&service.name) {
            return Err(ServiceError::AlreadyRunning(service.name));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let restarts = Arc::new(AtomicU32::new(0));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let launch = {
            let mut first = Some(process);
            let service = service.clone();
            let settings = self.settings.clone();
            let filters = self.filters.clone();
            let stop_rx = stop_rx.clone();
            move || {
                let first = first.take();
                let service = service.clone();
                let settings = settings.clone();
                let filters = filters.clone();
                let stop_rx = stop_rx.clone();
                async move {
                    let process = match first {
                        Some(p) => p,
                        None => {
                            ServiceProcess::bind(
                                service,
                                &settings.bind_host,
                                settings.relay.clone(),
                                filters,
                                settings.max_connections,
                            )
                            .await?
                        }
                    };
                    process.run(stop_rx).await
                }
            }
        };

        let task = {
            let name = service.name.clone();
            let policy = self.settings.restart;
            let restarts = restarts.clone();
            let table = self.running.clone();
            tokio::spawn(async move {
                let exit = supervise(&name, policy, stop_rx, restarts, launch).await;
                if exit == SupervisorExit::GaveUp {
                    // crashed for good: drop the entry unless it was replaced meanwhile
                    let mut running = table.lock();
                    if running.get(&name).map(|r| r.generation) == Some(generation) {
                        running.remove(&name);
                    }
                }
            })
        };

        tracing::info!("🚀 Started service {}", service);
        running.insert(
            service.name.clone(),
            RunningService {
                service,
                started_at: Utc::now(),
                restarts,
                generation,
                stop_tx,
                task,
            },
        );
        Ok(())
    }

    /// Best-effort stop. Unknown names are logged and ignored. Returns whether
    /// the service was running.
    pub async fn stop(&self, name: &str) -> bool {
        let Some(record) = self.running.lock().remove(name) else {
            tracing::warn!("Service {} not running", name);
            return false;
        };

        if record.stop_tx.send(true).is_err() {
            tracing::warn!("Service {} was already gone", name);
        }

        let mut task = record.task;
        match tokio::time::timeout(self.settings.shutdown_grace, &mut task).await {
            Ok(Ok(())) => tracing::info!("⏹️ Stopped service {}", name),
            Ok(Err(e)) => tracing::warn!("Service {} task ended abnormally: {}", name, e),
            Err(_) => {
                tracing::warn!("Service {} did not stop in time; aborting", name);
                task.abort();
            }
        }
        true
    }

    pub async fn stop_all(&self) {
        let names: Vec<String> = self.running.lock().keys().cloned().collect();
        for name in names {
            self.stop(&name).await;
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().contains_key(name)
    }

    pub fn running(&self) -> Vec<RunningServiceEntry> {
        let running = self.running.lock();
        let mut entries: Vec<RunningServiceEntry> = running
            .values()
            .map(|r| RunningServiceEntry {
                service: r.service.clone(),
                started_at: r.started_at,
                restarts: r.restarts.load(Ordering::Relaxed),
            })
            .collect();
        entries.sort_by(|a, b| a.service.name.cmp(&b.service.name));
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Stopped,
    GaveUp,
}

/// Runs `launch` on its own task and relaunches it after a crash (error or
/// panic) until `policy.max_restarts` is exhausted or a stop is requested.
pub async fn supervise<F, Fut>(
    name: &str,
    policy: RestartPolicy,
    mut stop_rx: watch::Receiver<bool>,
    restarts: Arc<AtomicU32>,
    mut launch: F,
) -> SupervisorExit
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    let stop_requested =
        |rx: &watch::Receiver<bool>| *rx.borrow() || rx.has_changed().is_err();

    loop {
        let result = tokio::spawn(launch()).await;
        if stop_requested(&stop_rx) {
            return SupervisorExit::Stopped;
        }

        match result {
            Ok(Ok(())) => tracing::warn!("Service {} exited unexpectedly", name),
            Ok(Err(e)) => tracing::error!("Service {} crashed: {}", name, e),
            Err(e) => tracing::error!("Service {} panicked: {}", name, e),
        }

        let attempt = restarts.load(Ordering::Relaxed);
        if attempt >= policy.max_restarts {
            tracing::error!(
                "❌ Service {} exceeded {} restarts; giving up",
                name,
                policy.max_restarts
            );
            metrics::counter!("ctf_proxy_service_gave_up_total", "service" => name.to_string())
                .increment(1);
            return SupervisorExit::GaveUp;
        }
        restarts.store(attempt + 1, Ordering::Relaxed);
        tracing::info!("🔄 Restarting {} (attempt {})", name, attempt + 1);

        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            _ = stop_rx.wait_for(|stop| *stop) => return SupervisorExit::Stopped,
        }
    }
}
