use ctf_proxy::bootstrap;
use ctf_proxy::broker::FilterBroker;
use ctf_proxy::collaborators::{ConfigStore, JsonConfigStore};
use ctf_proxy::config::loader::FilterLoader;
use ctf_proxy::config::Settings;
use ctf_proxy::error::AppError;
use ctf_proxy::service_manager::ServiceManager;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let settings = Settings::from_env()?;

    // 1. Logging + metrics
    let _guard = bootstrap::logging::init_logging(&settings.log_dir);
    tracing::info!("Starting CTF proxy...");
    bootstrap::metrics::init_metrics(settings.metrics_addr)?;

    // 2. Broker, seeded from the filters file
    let (broker, client) = FilterBroker::new(settings.broker_timeout);
    let broker_task = broker.spawn();

    let store = JsonConfigStore::new(settings.config_path.clone());
    FilterLoader::load_into(&settings.filters_path, &client, &store).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    #[cfg(unix)]
    {
        let listener = ctf_proxy::broker::remote::bind(&settings.broker_socket)?;
        tokio::spawn(ctf_proxy::broker::remote::serve(
            listener,
            client.clone(),
            shutdown_rx.clone(),
        ));
        tracing::info!("🎮 Broker control socket at {}", settings.broker_socket.display());
    }
    #[cfg(not(unix))]
    drop(shutdown_rx);

    // 3. Services
    let manager = ServiceManager::new(settings.manager_settings(), Arc::new(client.clone()));
    for service in store.list_services().await? {
        if !service.active {
            tracing::info!("Skipping inactive service {}", service.name);
            continue;
        }
        // one bad service must not keep the others down
        if let Err(e) = manager.start(service).await {
            tracing::error!("❌ {}", e);
        }
    }
    tracing::info!("🚀 {} services protected", manager.running().len());

    // 4. Wait for SIGINT / SIGTERM, then tear down in reverse order
    wait_for_shutdown().await?;
    tracing::info!("Shutting down...");

    manager.stop_all().await;
    let _ = shutdown_tx.send(true);
    client.shutdown().await;
    if let Err(e) = broker_task.await {
        tracing::error!("Broker task failed: {}", e);
    }

    tracing::info!("Bye");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
