#![allow(dead_code)]

use ctf_proxy::broker::{BrokerClient, FilterBroker};
use ctf_proxy::filter::{FilterDefinition, FilterRule};
use ctf_proxy::registry::FilterRegistry;
use ctf_proxy::relay::RelaySettings;
use ctf_proxy::service_manager::{ManagerSettings, RestartPolicy, ServiceManager};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The real services listen here; the proxy binds the same port on 127.0.0.1.
pub const BACKEND_HOST: &str = "127.0.0.2";
pub const PROXY_HOST: &str = "127.0.0.1";

/// A backend that echoes everything and remembers what it saw.
pub struct EchoBackend {
    pub port: u16,
    pub seen: Arc<Mutex<Vec<u8>>>,
}

impl EchoBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind((BACKEND_HOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        let n = match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        log.lock().extend_from_slice(&buf[..n]);
                        if sock.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { port, seen }
    }

    pub fn saw(&self, needle: &[u8]) -> bool {
        self.seen.lock().windows(needle.len()).any(|w| w == needle)
    }
}

/// A minimal HTTP backend: answers every request head with `200 ok`.
pub async fn http_backend() -> u16 {
    let listener = TcpListener::bind((BACKEND_HOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut pending = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    pending.extend_from_slice(&buf[..n]);
                    while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                        pending.drain(..end + 4);
                        let reply = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
                        if sock.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    port
}

pub fn contains(name: &str, pattern: &str) -> FilterDefinition {
    FilterDefinition::new(
        name,
        FilterRule::Contains {
            pattern: pattern.to_string(),
            reason: format!("matched {}", name),
            case_insensitive: false,
        },
    )
}

pub struct Harness {
    pub client: BrokerClient,
    pub manager: ServiceManager,
    broker: JoinHandle<FilterRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        let (broker, client) = FilterBroker::new(Duration::from_secs(2));
        let broker = broker.spawn();

        let settings = ManagerSettings {
            bind_host: PROXY_HOST.to_string(),
            relay: Arc::new(RelaySettings {
                backend_host: BACKEND_HOST.to_string(),
                connect_timeout: Duration::from_secs(1),
                idle_timeout: Duration::from_secs(5),
                ..RelaySettings::default()
            }),
            max_connections: 16,
            restart: RestartPolicy {
                max_restarts: 1,
                delay: Duration::from_millis(10),
            },
            shutdown_grace: Duration::from_secs(1),
        };
        let manager = ServiceManager::new(settings, Arc::new(client.clone()));

        Self {
            client,
            manager,
            broker,
        }
    }

    pub async fn shutdown(self) {
        self.manager.stop_all().await;
        self.client.shutdown().await;
        self.broker.await.unwrap();
    }
}
