//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rerank_proxy::config::ProxyConfig;
use rerank_proxy::http::MessageParser;
use rerank_proxy::net::Listener;
use rerank_proxy::{ProxyServer, RankError, Ranker, Shutdown};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A mock search engine that records every request it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockUpstream {
    /// Raw bytes of every complete request received so far.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a mock upstream that reads one full request per connection and
/// answers with `response`, written in `fragment`-sized pieces.
pub async fn start_scripted_upstream(response: Vec<u8>, fragment: usize) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let response = Arc::new(response);

    let recorded = requests.clone();
    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let recorded = recorded.clone();
                    let response = response.clone();
                    tokio::spawn(async move {
                        let (request, _) = read_request(&mut socket).await;
                        recorded.lock().unwrap().push(request);
                        for piece in response.chunks(fragment.max(1)) {
                            if socket.write_all(piece).await.is_err() {
                                return;
                            }
                            tokio::time::sleep(Duration::from_millis(2)).await;
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream {
        addr,
        requests,
        connections,
    }
}

/// Start a mock upstream that answers with the request body as a JSON response.
pub async fn start_echo_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));

    let recorded = requests.clone();
    let counter = connections.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let (request, body) = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);
                let body = String::from_utf8_lossy(&body).into_owned();
                let _ = socket.write_all(&json_response(&body)).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream {
        addr,
        requests,
        connections,
    }
}

/// Start a mock upstream answering every request with a JSON body.
pub async fn start_json_upstream(body: &str) -> MockUpstream {
    start_scripted_upstream(json_response(body), usize::MAX).await
}

/// A `200 OK` response with a Content-Length framed JSON body.
pub fn json_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nX-Upstream: mock\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

/// Read one complete request, returning its raw bytes and decoded body.
async fn read_request(socket: &mut TcpStream) -> (Vec<u8>, Vec<u8>) {
    let mut parser = MessageParser::request();
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match tokio::time::timeout(IO_TIMEOUT, socket.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            _ => break,
        };
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        if matches!(parser.feed(&buf[..n]), Ok(true) | Err(_)) {
            break;
        }
    }
    (raw, parser.body().to_vec())
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config pointing at `upstream`, with short timeouts for tests.
pub fn test_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.address = upstream.to_string();
    config.timeouts.connect_secs = 2;
    config.timeouts.idle_secs = 5;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// Start a proxy with an explicit model.
pub async fn start_proxy(config: ProxyConfig, ranker: Arc<dyn Ranker>) -> TestProxy {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::with_ranker(config, ranker);

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    TestProxy { addr, shutdown }
}

/// Write `fragments` one by one, then read until the proxy closes.
pub async fn exchange(addr: SocketAddr, fragments: &[&[u8]]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for fragment in fragments {
        stream.write_all(fragment).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut response = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    response
}

/// Split a raw response into head and body at the first blank line.
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let pos = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    (
        String::from_utf8_lossy(&raw[..pos]).into_owned(),
        raw[pos + 4..].to_vec(),
    )
}

/// Model returning a fixed permutation.
#[derive(Debug)]
pub struct FixedRanker(pub Vec<usize>);

impl Ranker for FixedRanker {
    fn name(&self) -> &str {
        "fixed"
    }

    fn rank(&self, _top_k: usize, _query: &str, _candidates: &[String]) -> Result<Vec<usize>, RankError> {
        Ok(self.0.clone())
    }
}

/// Model that always fails.
#[derive(Debug)]
pub struct FailingRanker;

impl Ranker for FailingRanker {
    fn name(&self) -> &str {
        "failing"
    }

    fn rank(&self, _top_k: usize, _query: &str, _candidates: &[String]) -> Result<Vec<usize>, RankError> {
        Err(RankError::Failed("model unavailable".into()))
    }
}

/// Model that panics.
#[derive(Debug)]
pub struct PanickingRanker;

impl Ranker for PanickingRanker {
    fn name(&self) -> &str {
        "panicking"
    }

    fn rank(&self, _top_k: usize, _query: &str, _candidates: &[String]) -> Result<Vec<usize>, RankError> {
        panic!("model crashed")
    }
}
