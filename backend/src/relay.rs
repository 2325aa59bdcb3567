//! Per-connection forwarder between a client and the real service.

use crate::broker::FilterSource;
use crate::constants;
use crate::filter::{ChainVerdict, Direction, FilterChain, FilterContext};
use crate::framing::{FramingError, StreamFramer};
use crate::service::Service;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Knobs shared by every relay of a service.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Host where the real services listen. The port is always the service port.
    pub backend_host: String,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            backend_host: constants::network::BACKEND_HOST.to_string(),
            connect_timeout: Duration::from_millis(constants::timeout::CONNECT_MS),
            idle_timeout: Duration::from_secs(constants::timeout::IDLE_SECS),
            max_message_bytes: constants::framing::MAX_MESSAGE_BYTES,
        }
    }
}

/// How a relay ended. Relays never fail upward; this is for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    BackendUnavailable,
    FilterLookupFailed,
    Closed(Direction),
    Blocked { filter: String, reason: String },
    IdleTimeout,
    SocketError(String),
}

/// Text sent to a client instead of a blocked message.
pub fn block_notice(service: &Service, reason: &str) -> Bytes {
    let line = format!(
        "{} {} : {}\n",
        constants::notice::MARKER,
        service.name,
        reason
    );
    if !service.protocol_type.is_http() {
        return Bytes::from(line);
    }

    let status = constants::http::FORBIDDEN;
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Forbidden"),
        line.len(),
        line
    );
    Bytes::from(response)
}

pub struct ConnectionRelay {
    service: Arc<Service>,
    settings: Arc<RelaySettings>,
    filters: Arc<dyn FilterSource>,
}

impl ConnectionRelay {
    pub fn new(
        service: Arc<Service>,
        settings: Arc<RelaySettings>,
        filters: Arc<dyn FilterSource>,
    ) -> Self {
        Self {
            service,
            settings,
            filters,
        }
    }

    /// Relays one accepted connection until either side closes or a filter
    /// blocks. Both sockets are closed when this returns.
    pub async fn run(&self, client: TcpStream, peer: SocketAddr) -> RelayOutcome {
        let service = &self.service;
        metrics::counter!("ctf_proxy_connections_total", "service" => service.name.clone())
            .increment(1);

        let backend_addr = (self.settings.backend_host.as_str(), service.port);
        let backend = match timeout(self.settings.connect_timeout, TcpStream::connect(backend_addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!("backend {}:{} unavailable: {}", backend_addr.0, backend_addr.1, e);
                metrics::counter!("ctf_proxy_backend_unavailable_total", "service" => service.name.clone())
                    .increment(1);
                return RelayOutcome::BackendUnavailable;
            }
            Err(_) => {
                tracing::debug!("backend {}:{} connect timed out", backend_addr.0, backend_addr.1);
                metrics::counter!("ctf_proxy_backend_unavailable_total", "service" => service.name.clone())
                    .increment(1);
                return RelayOutcome::BackendUnavailable;
            }
        };

        // Resolved once per connection. A broker failure closes the
        // connection: it must not look like "no filters".
        let chain = match self.filters.subscribed_filters(service).await {
            Ok(defs) => match FilterChain::compile(&defs) {
                Ok(chain) => chain,
                Err(e) => {
                    tracing::error!("❌ Rejected filter set for {}: {}", service.name, e);
                    return RelayOutcome::FilterLookupFailed;
                }
            },
            Err(e) => {
                tracing::error!("❌ Filter lookup failed for {}: {}", service.name, e);
                return RelayOutcome::FilterLookupFailed;
            }
        };
        tracing::debug!(filters = chain.len(), "relay established");

        self.pump(client, backend, peer, &chain).await
    }

    async fn pump(
        &self,
        client: TcpStream,
        backend: TcpStream,
        peer: SocketAddr,
        chain: &FilterChain,
    ) -> RelayOutcome {
        let service = &self.service;
        let max = self.settings.max_message_bytes;
        let (mut client_rx, mut client_tx) = client.into_split();
        let (mut backend_rx, mut backend_tx) = backend.into_split();
        let (mut requests, mut responses) = StreamFramer::pair(service.protocol_type, max);

        loop {
            let (direction, read) = tokio::select! {
                r = requests.next_message(&mut client_rx) => (Direction::ClientToBackend, r),
                r = responses.next_message(&mut backend_rx) => (Direction::BackendToClient, r),
                _ = tokio::time::sleep(self.settings.idle_timeout) => {
                    tracing::debug!("relay idle, closing");
                    return RelayOutcome::IdleTimeout;
                }
            };

            let message = match read {
                Ok(m) => m,
                Err(FramingError::ConnectionClosed) => {
                    tracing::debug!("{} side closed", direction);
                    let _ = client_tx.shutdown().await;
                    let _ = backend_tx.shutdown().await;
                    return RelayOutcome::Closed(direction);
                }
                Err(e) => {
                    tracing::debug!("relay read failed ({}): {}", direction, e);
                    return RelayOutcome::SocketError(e.to_string());
                }
            };

            let ctx = FilterContext {
                service,
                peer,
                direction,
            };
            match chain.evaluate(&message, &ctx) {
                ChainVerdict::Pass => {
                    let out = match direction {
                        Direction::ClientToBackend => &mut backend_tx,
                        Direction::BackendToClient => &mut client_tx,
                    };
                    if let Err(e) = out.write_all(&message).await {
                        tracing::debug!("relay write failed ({}): {}", direction, e);
                        return RelayOutcome::SocketError(e.to_string());
                    }
                    metrics::counter!("ctf_proxy_messages_forwarded_total", "service" => service.name.clone())
                        .increment(1);
                }
                ChainVerdict::Blocked { filter, reason } => {
                    tracing::warn!(
                        filter = %filter,
                        %direction,
                        "⛔ Blocked message on {}: {}",
                        service.name,
                        reason
                    );
                    metrics::counter!(
                        "ctf_proxy_messages_blocked_total",
                        "service" => service.name.clone(),
                        "filter" => filter.clone()
                    )
                    .increment(1);

                    let notice = block_notice(service, &reason);
                    if let Err(e) = client_tx.write_all(&notice).await {
                        tracing::debug!("failed to deliver block notice: {}", e);
                    }
                    let _ = client_tx.shutdown().await;
                    let _ = backend_tx.shutdown().await;
                    return RelayOutcome::Blocked { filter, reason };
                }
            }
        }
    }
}
