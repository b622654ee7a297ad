//! Per-connection state machine.
//!
//! # Data Flow
//! ```text
//! Accepted
//!     → read request head, route on it (status / search / unknown)
//!     → read request to its boundary, classify
//!     → status:           local JSON reply, upstream never contacted
//!     → unknown/missing:  UpstreamConnecting → RelayingRequest → AwaitingResponse (streamed back)
//!     → search:           UpstreamConnecting → RelayingRequest → AwaitingResponse
//!                         → ModelRanking → SendingClientResponse
//!     → Closed
//! ```
//!
//! # Design Decisions
//! - One finalizer per connection: send the pending reply, close both sockets
//! - Panics are caught at this boundary and become a 500
//! - Once bytes have reached the client no synthesized reply is sent

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::FutureExt;
use http::{header, Method, StatusCode};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::capture::Capture;
use crate::http::message::{Framing, MessageParser, RequestHead};
use crate::http::{relay, request, response};
use crate::net::{ConnectionId, ConnectionTracker};
use crate::observability::metrics;
use crate::ranking::{self, Ranker};
use crate::routing::{Classification, Classifier, Outcome, Route};
use crate::search::{results, SearchRequest};

/// Upper bounds on draining late client input before close.
const LINGER: Duration = Duration::from_secs(2);
const LINGER_MAX_BYTES: usize = 256 * 1024;

/// State shared by every connection. Read-only apart from the tracker.
#[derive(Debug)]
pub struct ProxyContext {
    pub config: ProxyConfig,
    pub classifier: Classifier,
    pub ranker: Arc<dyn Ranker>,
    pub tracker: ConnectionTracker,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig, ranker: Arc<dyn Ranker>) -> Self {
        let classifier = Classifier::from_config(&config);
        Self {
            config,
            classifier,
            ranker,
            tracker: ConnectionTracker::new(),
        }
    }

    fn idle(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.idle_secs)
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.connect_secs)
    }
}

/// Where a connection is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Accepted,
    UpstreamConnecting,
    RelayingRequest,
    AwaitingResponse,
    ModelRanking,
    SendingClientResponse,
    Closed,
}

/// What the finalizer still owes the client.
enum Reply {
    Send(Bytes),
    /// Response bytes were streamed already.
    Sent,
}

struct Connection {
    request_id: String,
    client: Capture<TcpStream>,
    upstream: Option<TcpStream>,
    stage: Stage,
    /// Bytes delivered to the client so far.
    written: u64,
}

impl Connection {
    fn enter(&mut self, stage: Stage) {
        tracing::trace!(from = ?self.stage, to = ?stage, "Stage transition");
        self.stage = stage;
    }

    /// Map a handler error to its outcome and the reply the client gets.
    fn fail(&self, err: &ProxyError) -> (Outcome, Reply) {
        let status = err.status_code();
        let outcome = if err.is_upstream() {
            tracing::error!(error = %err, stage = ?self.stage, status = status.as_u16(), "Upstream failure");
            Outcome::UpstreamConnectionError
        } else {
            match err {
                ProxyError::Internal(_) | ProxyError::Model(_) => {
                    tracing::error!(error = %err, stage = ?self.stage, "Internal failure")
                }
                _ => tracing::warn!(error = %err, stage = ?self.stage, status = status.as_u16(), "Request rejected"),
            }
            Outcome::InternalError
        };

        if self.written > 0 {
            return (outcome, Reply::Sent);
        }
        (
            outcome,
            Reply::Send(response::error(status, err.public_message(), &self.request_id)),
        )
    }

    async fn finish(&mut self, reply: Reply) {
        if let Reply::Send(bytes) = reply {
            self.enter(Stage::SendingClientResponse);
            match relay::forward_raw(self.client.get_mut(), &bytes).await {
                Ok(()) => self.written += bytes.len() as u64,
                Err(e) => tracing::warn!(error = %e, "Failed to send response to client"),
            }
        }
        if let Some(mut upstream) = self.upstream.take() {
            let _ = upstream.shutdown().await;
        }
        let client = self.client.get_mut();
        if client.shutdown().await.is_ok() {
            linger(client).await;
        }
        self.enter(Stage::Closed);
    }
}

/// Serve one client connection to completion.
pub async fn handle_connection(
    ctx: Arc<ProxyContext>,
    stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
) {
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "connection",
        connection_id = %id,
        request_id = %request_id,
        %peer
    );

    async move {
        let start = Instant::now();
        let _ = stream.set_nodelay(true);
        let mut conn = Connection {
            request_id,
            client: Capture::new(stream, ctx.config.limits.max_message_bytes),
            upstream: None,
            stage: Stage::Accepted,
            written: 0,
        };
        tracing::debug!("Connection accepted");

        let result = AssertUnwindSafe(process(&ctx, &mut conn))
            .catch_unwind()
            .await;
        let (outcome, reply) = match result {
            Ok(Ok(done)) => done,
            Ok(Err(err)) => conn.fail(&err),
            Err(panic) => conn.fail(&ProxyError::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        conn.finish(reply).await;
        metrics::record_connection(outcome, start);
        tracing::info!(
            %outcome,
            bytes_to_client = conn.written,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }
    .instrument(span)
    .await
}

/// Read and discard until the client closes.
///
/// Closing a socket with unread input resets the connection, which can
/// destroy a reply the client has not read yet.
async fn linger(stream: &mut TcpStream) {
    let mut buf = [0u8; 4096];
    let mut drained = 0;
    let _ = tokio::time::timeout(LINGER, async {
        while drained < LINGER_MAX_BYTES {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
    })
    .await;
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

async fn process(ctx: &ProxyContext, conn: &mut Connection) -> Result<(Outcome, Reply), ProxyError> {
    let limits = &ctx.config.limits;
    let mut request = MessageParser::request().with_max_header_bytes(limits.max_header_bytes);

    relay::read_head(&mut conn.client, &mut request, ctx.idle(), limits.max_message_bytes).await?;
    let head = request
        .request_head()
        .cloned()
        .ok_or_else(|| ProxyError::Internal("request head missing after read".into()))?;

    let route = ctx.classifier.route(&head);
    tracing::debug!(method = %head.method, target = %head.target, ?route, "Request routed");
    if route != Route::Search {
        request.set_retain_body(false);
    }
    relay::read_to_completion(&mut conn.client, &mut request, ctx.idle(), limits.max_message_bytes).await?;

    match ctx.classifier.classify(&head, request.body()) {
        Classification::Status => Ok((Outcome::StatusRequest, Reply::Send(status_reply(ctx)))),
        Classification::Unknown => passthrough(ctx, conn, &head.method, Outcome::UnknownRequest).await,
        Classification::MissingQuery(reason) => {
            tracing::debug!(%reason, "Search request without a usable query, passing through");
            passthrough(ctx, conn, &head.method, Outcome::MissingQuery).await
        }
        Classification::Search(search) => intercept(ctx, conn, &head, request.body(), search).await,
    }
}

fn status_reply(ctx: &ProxyContext) -> Bytes {
    let config = &ctx.config;
    let document = json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "upstream": config.upstream.address,
        "model": ctx.ranker.name(),
        "search": {
            "paths": config.search.paths,
            "default_top_k": config.search.default_top_k,
            "multiplier": config.search.multiplier,
        },
        "active_connections": ctx.tracker.active_count(),
    });
    response::json(StatusCode::OK, &document)
}

async fn connect_upstream(ctx: &ProxyContext, conn: &mut Connection) -> Result<(), ProxyError> {
    conn.enter(Stage::UpstreamConnecting);
    let addr = ctx.config.upstream.address.as_str();
    let stream = tokio::time::timeout(ctx.connect_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::UpstreamConnectTimeout { addr: addr.to_string() })?
        .map_err(|source| ProxyError::UpstreamConnect {
            addr: addr.to_string(),
            source,
        })?;
    let _ = stream.set_nodelay(true);
    tracing::debug!(upstream = %addr, "Upstream connected");
    conn.upstream = Some(stream);
    Ok(())
}

fn connected(upstream: &mut Option<TcpStream>) -> Result<&mut TcpStream, ProxyError> {
    upstream
        .as_mut()
        .ok_or_else(|| ProxyError::Internal("upstream not connected".into()))
}

/// Forward the captured request unchanged and stream the response back.
async fn passthrough(
    ctx: &ProxyContext,
    conn: &mut Connection,
    method: &Method,
    outcome: Outcome,
) -> Result<(Outcome, Reply), ProxyError> {
    connect_upstream(ctx, conn).await?;

    conn.enter(Stage::RelayingRequest);
    let raw = conn.client.take();
    relay::forward_raw(connected(&mut conn.upstream)?, &raw)
        .await
        .map_err(ProxyError::UpstreamIo)?;
    tracing::debug!(bytes = raw.len(), "Request relayed upstream");

    conn.enter(Stage::AwaitingResponse);
    let mut response =
        MessageParser::response(Some(method)).with_max_header_bytes(ctx.config.limits.max_header_bytes);
    let upstream = connected(&mut conn.upstream)?;
    let end = relay::relay_response(
        upstream,
        conn.client.get_mut(),
        &mut response,
        ctx.idle(),
        &mut conn.written,
    )
    .await?;
    tracing::debug!(?end, bytes = conn.written, "Response relayed");

    Ok((outcome, Reply::Sent))
}

/// Send the rewritten search upstream, rank the candidates, rewrite the response.
async fn intercept(
    ctx: &ProxyContext,
    conn: &mut Connection,
    head: &RequestHead,
    body: &[u8],
    search: SearchRequest,
) -> Result<(Outcome, Reply), ProxyError> {
    let config = &ctx.config;
    let rewritten = search.upstream_body(&config.search);
    let outgoing = request::build_upstream_request(head, rewritten.as_deref().unwrap_or(body));

    connect_upstream(ctx, conn).await?;

    conn.enter(Stage::RelayingRequest);
    conn.client.take();
    relay::forward_raw(connected(&mut conn.upstream)?, &outgoing)
        .await
        .map_err(ProxyError::UpstreamIo)?;
    tracing::debug!(
        query = %search.query,
        top_k = search.top_k,
        resized = rewritten.is_some(),
        "Search request sent upstream"
    );

    conn.enter(Stage::AwaitingResponse);
    let limit = config.limits.max_message_bytes;
    let mut response =
        MessageParser::response(Some(&head.method)).with_max_header_bytes(config.limits.max_header_bytes);
    let mut capture = Capture::new(connected(&mut conn.upstream)?, limit);
    let read = relay::read_to_completion(&mut capture, &mut response, ctx.idle(), limit).await;
    let raw = capture.take();

    match read {
        Ok(()) => {}
        Err(ProxyError::MessageTooLarge { .. }) => {
            tracing::warn!(limit, "Search response exceeds the buffer limit, relaying unchanged");
            let upstream = capture.into_inner();
            let client = conn.client.get_mut();
            relay::forward_raw(client, &raw).await.map_err(ProxyError::ClientIo)?;
            conn.written += raw.len() as u64;
            relay::copy_until_close(upstream, client, ctx.idle(), &mut conn.written).await?;
            return Ok((Outcome::ResponseError, Reply::Sent));
        }
        Err(ProxyError::MalformedMessage(err)) => {
            tracing::warn!(error = %err, "Upstream response framing is invalid, sending minimal response");
            return Ok((Outcome::ResponseError, Reply::Send(degraded(&response, &raw))));
        }
        Err(err) => return Err(err),
    }

    let head = response
        .response_head()
        .cloned()
        .ok_or_else(|| ProxyError::Internal("response head missing after read".into()))?;
    if !head.status.is_success() {
        tracing::warn!(status = head.status.as_u16(), "Upstream search failed, relaying response unchanged");
        return Ok((Outcome::ResponseError, Reply::Send(raw)));
    }

    let mut document = match results::parse_body(response.body()) {
        Ok(document) => document,
        Err(err) => {
            tracing::warn!(error = %err, "Search response not rankable, relaying unchanged");
            return Ok((Outcome::ResponseError, Reply::Send(raw)));
        }
    };
    let candidates = match results::candidates(&document, &config.search) {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(error = %err, "Search response not rankable, relaying unchanged");
            return Ok((Outcome::ResponseError, Reply::Send(raw)));
        }
    };

    conn.enter(Stage::ModelRanking);
    let count = candidates.len();
    let started = Instant::now();
    let ranked = rank(ctx, &search, candidates).await;
    let elapsed = started.elapsed();
    metrics::record_rank(ctx.ranker.name(), elapsed, ranked.is_ok());

    let ranking = match ranked {
        Ok(ranking) => ranking,
        Err(err) => {
            tracing::warn!(error = %err, model = ctx.ranker.name(), "Ranking failed, returning upstream response");
            return Ok((Outcome::ResponseError, Reply::Send(raw)));
        }
    };
    if let Err(err) = results::reorder(&mut document, &config.search, &ranking) {
        tracing::warn!(error = %err, "Failed to reorder search response, relaying unchanged");
        return Ok((Outcome::ResponseError, Reply::Send(raw)));
    }

    let took_ms = elapsed.as_secs_f64() * 1_000.0;
    if config.search.debug {
        if let Some(object) = document.as_object_mut() {
            object.insert(
                "_rerank".to_string(),
                json!({
                    "model": ctx.ranker.name(),
                    "ranks": ranking,
                    "took_ms": took_ms,
                }),
            );
        }
    }
    let body = serde_json::to_vec(&document).map_err(|e| ProxyError::Internal(e.to_string()))?;

    tracing::debug!(candidates = count, returned = ranking.len(), took_ms, "Search response re-ranked");
    Ok((Outcome::Success, Reply::Send(response::rewrite(&head, &body))))
}

async fn rank(
    ctx: &ProxyContext,
    search: &SearchRequest,
    candidates: Vec<String>,
) -> Result<Vec<usize>, ProxyError> {
    let ranker = Arc::clone(&ctx.ranker);
    let query = search.query.clone();
    let top_k = search.top_k;

    tokio::task::spawn_blocking(move || ranking::rank_checked(ranker.as_ref(), top_k, &query, &candidates))
        .await
        .map_err(|e| ProxyError::Internal(format!("ranking task failed: {e}")))?
        .map_err(ProxyError::from)
}

/// Minimal response carrying whatever body bytes arrived.
fn degraded(response: &MessageParser, raw: &Bytes) -> Bytes {
    match response.response_head() {
        Some(head) => {
            let body = match response.framing() {
                Some(Framing::Chunked) => response.body(),
                _ => raw.get(response.head_len()..).unwrap_or_default(),
            };
            response::minimal(head.status, head.headers.get(header::CONTENT_TYPE), body)
        }
        None => response::minimal(StatusCode::BAD_GATEWAY, None, raw),
    }
}
