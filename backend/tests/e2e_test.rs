mod common;

use common::{contains, http_backend, EchoBackend, Harness, PROXY_HOST};
use ctf_proxy::broker::remote::{self, RemoteBrokerClient};
use ctf_proxy::broker::{BrokerCommand, BrokerReply};
use ctf_proxy::filter::{FilterDefinition, FilterRule};
use ctf_proxy::service::{ProtocolType, Service};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect((PROXY_HOST, port)).await.unwrap()
}

async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    out
}

#[tokio::test]
async fn tcp_service_without_filters_is_transparent() {
    let backend = EchoBackend::start().await;
    let harness = Harness::new();
    harness
        .manager
        .start(Service::new("echo", backend.port, ProtocolType::Tcp))
        .await
        .unwrap();

    let mut conn = connect(backend.port).await;
    conn.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    timeout(WAIT, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"hello");

    conn.write_all(b" again").await.unwrap();
    let mut buf = [0u8; 6];
    timeout(WAIT, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b" again");

    drop(conn);
    harness.shutdown().await;
}

#[tokio::test]
async fn blocked_message_never_reaches_backend() {
    let backend = EchoBackend::start().await;
    let harness = Harness::new();
    let echo = Service::new("echo", backend.port, ProtocolType::Tcp);

    harness.client.add_filter(contains("no_evil", "evil")).await.unwrap();
    harness.client.subscribe(echo.clone(), "no_evil").await.unwrap();
    harness.manager.start(echo).await.unwrap();

    let mut conn = connect(backend.port).await;
    conn.write_all(b"evil payload").await.unwrap();
    let answer = String::from_utf8(read_all(&mut conn).await).unwrap();

    assert!(answer.starts_with("[CTF-PROXY] BLOCKED echo : matched no_evil"));
    assert!(!backend.saw(b"evil"));

    harness.shutdown().await;
}

#[tokio::test]
async fn new_subscriptions_apply_to_new_connections() {
    let backend = EchoBackend::start().await;
    let harness = Harness::new();
    let echo = Service::new("echo", backend.port, ProtocolType::Tcp);
    harness.client.add_filter(contains("no_flag", "FLAG")).await.unwrap();
    harness.manager.start(echo.clone()).await.unwrap();

    let mut before = connect(backend.port).await;
    before.write_all(b"FLAG{1}").await.unwrap();
    let mut buf = [0u8; 7];
    timeout(WAIT, before.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"FLAG{1}");
    drop(before);

    harness.client.subscribe(echo.clone(), "no_flag").await.unwrap();
    let mut after = connect(backend.port).await;
    after.write_all(b"FLAG{2}").await.unwrap();
    let answer = read_all(&mut after).await;
    assert!(answer.starts_with(b"[CTF-PROXY] BLOCKED"));
    assert!(!backend.saw(b"FLAG{2}"));

    // and lifting it restores traffic
    harness.client.unsubscribe_all(echo).await.unwrap();
    let mut lifted = connect(backend.port).await;
    lifted.write_all(b"FLAG{3}").await.unwrap();
    timeout(WAIT, lifted.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"FLAG{3}");

    harness.shutdown().await;
}

#[tokio::test]
async fn http_service_gets_forbidden_response() {
    let port = http_backend().await;
    let harness = Harness::new();
    let web = Service::new("web", port, ProtocolType::Http);

    harness
        .client
        .add_filter(FilterDefinition::new(
            "no_flag_path",
            FilterRule::Regex {
                pattern: r"^GET /flag".to_string(),
                reason: "flag path".to_string(),
            },
        ))
        .await
        .unwrap();
    harness.client.subscribe(web.clone(), "no_flag_path").await.unwrap();
    harness.manager.start(web).await.unwrap();

    let mut ok = connect(port).await;
    ok.write_all(b"GET /index HTTP/1.1\r\nHost: web\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 40];
    let mut got = Vec::new();
    while !got.ends_with(b"ok") {
        let n = timeout(WAIT, ok.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "backend response cut short");
        got.extend_from_slice(&buf[..n]);
    }
    assert!(got.starts_with(b"HTTP/1.1 200 OK"));
    drop(ok);

    let mut denied = connect(port).await;
    denied
        .write_all(b"GET /flag HTTP/1.1\r\nHost: web\r\n\r\n")
        .await
        .unwrap();
    let answer = String::from_utf8(read_all(&mut denied).await).unwrap();
    assert!(answer.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(answer.contains("Connection: close"));
    assert!(answer.ends_with("[CTF-PROXY] BLOCKED web : flag path\n"));

    harness.shutdown().await;
}

#[tokio::test]
async fn stopped_service_releases_its_port() {
    let backend = EchoBackend::start().await;
    let harness = Harness::new();
    harness
        .manager
        .start(Service::new("echo", backend.port, ProtocolType::Tcp))
        .await
        .unwrap();
    assert!(harness.manager.is_running("echo"));

    assert!(harness.manager.stop("echo").await);
    assert!(!harness.manager.is_running("echo"));
    TcpListener::bind((PROXY_HOST, backend.port)).await.unwrap();

    harness.shutdown().await;
}

#[tokio::test]
async fn services_are_independent() {
    let a = EchoBackend::start().await;
    let b = EchoBackend::start().await;
    let harness = Harness::new();
    harness
        .manager
        .start(Service::new("a", a.port, ProtocolType::Tcp))
        .await
        .unwrap();
    harness
        .manager
        .start(Service::new("b", b.port, ProtocolType::Tcp))
        .await
        .unwrap();

    harness.manager.stop("a").await;

    let mut conn = connect(b.port).await;
    conn.write_all(b"still here").await.unwrap();
    let mut buf = [0u8; 10];
    timeout(WAIT, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"still here");

    harness.shutdown().await;
}

#[tokio::test]
async fn filters_can_be_managed_over_the_control_socket() {
    let backend = EchoBackend::start().await;
    let harness = Harness::new();
    let echo = Service::new("echo", backend.port, ProtocolType::Tcp);
    harness.manager.start(echo.clone()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("broker.sock");
    let listener = remote::bind(&socket).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = tokio::spawn(remote::serve(listener, harness.client.clone(), stop_rx));

    let operator = RemoteBrokerClient::new(&socket, Duration::from_secs(2));
    let reply = operator
        .ask(BrokerCommand::AddFilter {
            filter: contains("no_shell", "/bin/sh"),
        })
        .await
        .unwrap();
    assert_eq!(reply, BrokerReply::Unit);
    operator
        .ask(BrokerCommand::Subscribe {
            service: echo.clone(),
            filter: "no_shell".to_string(),
        })
        .await
        .unwrap();

    let mut conn = connect(backend.port).await;
    conn.write_all(b";/bin/sh -i").await.unwrap();
    let answer = read_all(&mut conn).await;
    assert!(answer.starts_with(b"[CTF-PROXY] BLOCKED echo"));

    stop_tx.send(true).unwrap();
    server.await.unwrap();
    harness.shutdown().await;
}
