//! Control socket for the broker.
//!
//! Anything outside this process (the management API, an operator shell)
//! reaches the broker through a Unix socket speaking newline-delimited JSON:
//! one [`BrokerCommand`] per line in, one `{"ok": ...}` or `{"err": ...}`
//! line out.

use super::{BrokerClient, BrokerCommand, BrokerError, BrokerReply, BrokerResult, FilterSource};
use crate::filter::FilterDefinition;
use crate::service::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireResponse {
    Ok(BrokerReply),
    Err(BrokerError),
}

impl From<BrokerResult<BrokerReply>> for WireResponse {
    fn from(result: BrokerResult<BrokerReply>) -> Self {
        match result {
            Ok(reply) => WireResponse::Ok(reply),
            Err(e) => WireResponse::Err(e),
        }
    }
}

impl WireResponse {
    fn into_result(self) -> BrokerResult<BrokerReply> {
        match self {
            WireResponse::Ok(reply) => Ok(reply),
            WireResponse::Err(e) => Err(e),
        }
    }
}

/// Binds the control socket, replacing a stale socket file left by a previous run.
/// Anything at `path` that is not a socket is left alone and reported.
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path)?,
        Ok(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a socket", path.display()),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    UnixListener::bind(path)
}

/// Accepts control connections until `shutdown` flips to `true`.
pub async fn serve(listener: UnixListener, client: BrokerClient, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("🎮 Broker control socket ready");
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, client).await {
                            tracing::debug!("control connection closed: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("control socket accept failed: {}", e);
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("control socket closed");
}

async fn handle_connection(stream: UnixStream, client: BrokerClient) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<BrokerCommand>(&line) {
            Ok(command) => client.ask(command).await,
            Err(e) => Err(BrokerError::Transport(format!("invalid command: {}", e))),
        };
        let mut out = serde_json::to_vec(&WireResponse::from(result))?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
    Ok(())
}

/// Broker stub for callers in another process.
#[derive(Debug, Clone)]
pub struct RemoteBrokerClient {
    path: PathBuf,
    timeout: Duration,
}

impl RemoteBrokerClient {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub async fn ask(&self, command: BrokerCommand) -> BrokerResult<BrokerReply> {
        match tokio::time::timeout(self.timeout, self.round_trip(&command)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    async fn round_trip(&self, command: &BrokerCommand) -> BrokerResult<BrokerReply> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|_| BrokerError::Unavailable)?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_vec(command).map_err(transport)?;
        line.push(b'\n');
        writer.write_all(&line).await.map_err(transport)?;

        let mut lines = BufReader::new(reader).lines();
        let answer = lines
            .next_line()
            .await
            .map_err(transport)?
            .ok_or(BrokerError::Unavailable)?;
        let resp: WireResponse = serde_json::from_str(&answer).map_err(transport)?;
        resp.into_result()
    }
}

fn transport(e: impl std::fmt::Display) -> BrokerError {
    BrokerError::Transport(e.to_string())
}

#[async_trait]
impl FilterSource for RemoteBrokerClient {
    async fn subscribed_filters(&self, service: &Service) -> BrokerResult<Vec<FilterDefinition>> {
        let cmd = BrokerCommand::SubscribedFilters {
            service: service.clone(),
        };
        match self.ask(cmd).await? {
            BrokerReply::Filters(f) => Ok(f),
            _ => Err(BrokerError::UnexpectedReply("subscribed_filters".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::FilterBroker;
    use crate::filter::FilterRule;
    use crate::registry::RegistryError;
    use crate::service::ProtocolType;

    fn no_evil() -> FilterDefinition {
        FilterDefinition::new(
            "no-evil",
            FilterRule::Contains {
                pattern: "evil".to_string(),
                reason: "evil".to_string(),
                case_insensitive: false,
            },
        )
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket_only() {
        let dir = tempfile::tempdir().unwrap();

        let sock = dir.path().join("broker.sock");
        drop(bind(&sock).unwrap());
        assert!(sock.exists());
        bind(&sock).unwrap();

        let regular = dir.path().join("filters.json");
        std::fs::write(&regular, b"{}").unwrap();
        let err = bind(&regular).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&regular).unwrap(), b"{}");
    }

    #[tokio::test]
    async fn remote_client_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");

        let (broker, client) = FilterBroker::new(Duration::from_secs(1));
        broker.spawn();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = bind(&path).unwrap();
        let server = tokio::spawn(serve(listener, client, shutdown_rx));

        let remote = RemoteBrokerClient::new(&path, Duration::from_secs(1));
        let echo = Service::new("echo", 9000, ProtocolType::Tcp);

        let reply = remote
            .ask(BrokerCommand::AddFilter { filter: no_evil() })
            .await
            .unwrap();
        assert_eq!(reply, BrokerReply::Unit);
        remote
            .ask(BrokerCommand::Subscribe {
                service: echo.clone(),
                filter: "no-evil".to_string(),
            })
            .await
            .unwrap();

        let filters = FilterSource::subscribed_filters(&remote, &echo).await.unwrap();
        assert_eq!(filters, vec![no_evil()]);

        let err = remote
            .ask(BrokerCommand::RemoveFilter {
                name: "ghost".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, BrokerError::Registry(RegistryError::NotFound("ghost".into())));

        shutdown_tx.send(true).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_line_gets_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");

        let (broker, client) = FilterBroker::new(Duration::from_secs(1));
        broker.spawn();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(serve(bind(&path).unwrap(), client, shutdown_rx));

        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"{\"op\":\"launch_missiles\"}\n").await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let answer = lines.next_line().await.unwrap().unwrap();
        let resp: WireResponse = serde_json::from_str(&answer).unwrap();
        assert!(matches!(resp, WireResponse::Err(BrokerError::Transport(_))));
    }

    #[tokio::test]
    async fn missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let remote = RemoteBrokerClient::new(dir.path().join("none.sock"), Duration::from_secs(1));
        assert_eq!(
            remote.ask(BrokerCommand::ListFilters).await.unwrap_err(),
            BrokerError::Unavailable
        );
    }
}
