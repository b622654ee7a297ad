//! Connections are served independently of each other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use rerank_proxy::ranking::ReverseRanker;
use rerank_proxy::{RankError, Ranker};

mod common;

use common::{
    exchange, json_response, split_response, start_echo_upstream, start_json_upstream, start_proxy,
    start_scripted_upstream, test_config, FixedRanker,
};

/// Well below the idle timeout used by `test_config`.
const PROMPT: Duration = Duration::from_secs(2);

/// Model that holds every call until the test releases it.
#[derive(Debug)]
struct GatedRanker {
    entered: Arc<AtomicUsize>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Ranker for GatedRanker {
    fn name(&self) -> &str {
        "gated"
    }

    fn rank(&self, _top_k: usize, _query: &str, candidates: &[String]) -> Result<Vec<usize>, RankError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(10));
        Ok((0..candidates.len()).rev().collect())
    }
}

fn search_request(body: &str) -> Vec<u8> {
    format!(
        "POST /_search HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

#[tokio::test]
async fn stalled_request_does_not_block_other_connections() {
    let upstream = start_json_upstream(r#"{"choices":["a"]}"#).await;
    let proxy = start_proxy(test_config(upstream.addr), Arc::new(FixedRanker(vec![0]))).await;

    let mut stalled = TcpStream::connect(proxy.addr).await.unwrap();
    stalled
        .write_all(b"POST /_search HTTP/1.1\r\nHost: x\r\nContent-Length: 100\r\n\r\n{")
        .await
        .unwrap();
    stalled.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let raw = exchange(proxy.addr, &[b"GET /rerank/status HTTP/1.1\r\nHost: x\r\n\r\n"]).await;
    assert!(start.elapsed() < PROMPT, "status took {:?}", start.elapsed());

    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"));
    let status: Value = serde_json::from_slice(&body).unwrap();
    assert!(status["active_connections"].as_u64().unwrap() >= 2);
    assert_eq!(upstream.connections(), 0);

    drop(stalled);
}

#[tokio::test]
async fn slow_model_does_not_block_passthrough() {
    let upstream = start_echo_upstream().await;
    let (release, gate) = mpsc::channel();
    let entered = Arc::new(AtomicUsize::new(0));
    let ranker = GatedRanker {
        entered: entered.clone(),
        release: Mutex::new(gate),
    };
    let proxy = start_proxy(test_config(upstream.addr), Arc::new(ranker)).await;

    let addr = proxy.addr;
    let search = tokio::spawn(async move {
        let request = search_request(r#"{"query":"q","choices":["a","b","c"]}"#);
        exchange(addr, &[&request]).await
    });

    let deadline = Instant::now() + PROMPT;
    while entered.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "model was never invoked");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let start = Instant::now();
    let raw = exchange(
        proxy.addr,
        &[b"PUT /books/_doc/1 HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\n{}"],
    )
    .await;
    assert!(start.elapsed() < PROMPT, "passthrough took {:?}", start.elapsed());
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"{}");
    assert!(!search.is_finished());

    release.send(()).unwrap();
    let raw = search.await.unwrap();
    let (_, body) = split_response(&raw);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["choices"], json!(["c", "b", "a"]));
}

#[tokio::test]
async fn concurrent_searches_are_each_reranked() {
    let response = json_response(r#"{"choices":["a","b","c","d"]}"#);
    let upstream = start_scripted_upstream(response, 3).await;
    let proxy = start_proxy(test_config(upstream.addr), Arc::new(ReverseRanker)).await;

    let concurrency = 20;
    let mut tasks = Vec::with_capacity(concurrency);
    for i in 0..concurrency {
        let addr = proxy.addr;
        tasks.push(tokio::spawn(async move {
            let request = search_request(&format!(r#"{{"query":"q{i}"}}"#));
            exchange(addr, &[&request]).await
        }));
    }

    for task in tasks {
        let raw = task.await.unwrap();
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200"));
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["choices"], json!(["d", "c", "b", "a"]));
    }
    assert_eq!(upstream.connections(), concurrency);
}
