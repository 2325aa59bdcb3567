//! Listener for one protected service.

use crate::broker::FilterSource;
use crate::constants;
use crate::relay::{ConnectionRelay, RelayOutcome, RelaySettings};
use crate::service::Service;
use crate::service_manager::ServiceError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Semaphore};
use tracing::Instrument;

pub struct ServiceProcess {
    service: Arc<Service>,
    listener: TcpListener,
    relay: Arc<ConnectionRelay>,
    /// Caps concurrent relays; the accept loop waits for a free slot.
    slots: Arc<Semaphore>,
}

impl ServiceProcess {
    /// Binds the service port. Failing to bind (port taken) fails the start.
    pub async fn bind(
        service: Service,
        bind_host: &str,
        settings: Arc<RelaySettings>,
        filters: Arc<dyn FilterSource>,
        max_connections: usize,
    ) -> Result<Self, ServiceError> {
        let port = service.port;
        let bind_err = |source: std::io::Error| ServiceError::Bind {
            service: service.name.clone(),
            port,
            source,
        };

        let addr = tokio::net::lookup_host((bind_host, port))
            .await
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| {
                bind_err(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve bind host '{}'", bind_host),
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket
            .listen(constants::network::LISTEN_BACKLOG)
            .map_err(bind_err)?;

        let service = Arc::new(service);
        let relay = Arc::new(ConnectionRelay::new(service.clone(), settings, filters));
        Ok(Self {
            service,
            listener,
            relay,
            slots: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns once `shutdown` turns `true` (or its sender is
    /// dropped); the listening socket is closed on return. Relays already
    /// running are left to finish on their own.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServiceError> {
        let name = self.service.name.clone();
        tracing::info!(
            "▶️ Proxying {} on :{} ({})",
            name,
            self.service.port,
            self.service.protocol_type
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        // e.g. EMFILE; back off instead of spinning
                        tracing::warn!("accept failed on {}: {}", name, e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            tracing::debug!("connection from {} to {}", peer, name);
            let relay = self.relay.clone();
            let span = tracing::info_span!("relay", service = %name, %peer);
            tokio::spawn(
                async move {
                    let outcome = relay.run(stream, peer).await;
                    match &outcome {
                        RelayOutcome::SocketError(e) => tracing::debug!("relay ended: {}", e),
                        other => tracing::debug!(?other, "relay ended"),
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }

        tracing::info!("⏹️ Stopped proxy for {} on :{}", name, self.service.port);
        Ok(())
    }
}
