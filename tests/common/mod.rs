#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;

pub fn content(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 131 % 253) as u8).collect()
}

pub fn sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

#[derive(Clone)]
pub struct ServerState {
    pub data: Arc<Vec<u8>>,
    /// GET requests seen, keyed by Range header ("" when absent)
    pub hits: Arc<Mutex<HashMap<String, u32>>>,
    /// Ranges that answer 503 for their first N requests
    pub flaky: Arc<HashMap<String, u32>>,
    /// Ranges that always answer 503
    pub broken: Arc<Vec<String>>,
    pub file: Option<PathBuf>,
}

impl ServerState {
    pub fn new(data: Vec<u8>) -> Self {
        ServerState {
            data: Arc::new(data),
            hits: Arc::new(Mutex::new(HashMap::new())),
            flaky: Arc::new(HashMap::new()),
            broken: Arc::new(Vec::new()),
            file: None,
        }
    }

    pub fn total_gets(&self) -> u32 {
        self.hits.lock().unwrap().values().sum()
    }

    pub fn ranged_gets(&self) -> u32 {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(_, v)| v)
            .sum()
    }

    fn record(&self, range: &str) -> u32 {
        let mut hits = self.hits.lock().unwrap();
        let n = hits.entry(range.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse::<usize>().ok()?.min(len.checked_sub(1)?);
    (start <= end).then_some((start, end))
}

fn range_of(headers: &HeaderMap) -> String {
    headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn ranged(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    let len = state.data.len();
    if method == Method::HEAD {
        return (
            [
                (header::CONTENT_LENGTH, len.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::empty(),
        )
            .into_response();
    }

    let range = range_of(&headers);
    let seen = state.record(&range);
    if state.broken.contains(&range) || state.flaky.get(&range).is_some_and(|n| seen <= *n) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match parse_range(&range, len) {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}")),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            state.data[start..=end].to_vec(),
        )
            .into_response(),
        None => state.data.to_vec().into_response(),
    }
}

/// Never advertises ranges and always sends the whole body.
async fn plain(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::GET {
        state.record(&range_of(&headers));
    }
    state.data.to_vec().into_response()
}

/// Streams a file from disk with no Content-Length.
async fn streamed(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::GET {
        state.record(&range_of(&headers));
    }
    let Some(path) = state.file.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::File::open(path).await {
        Ok(file) => Body::from_stream(ReaderStream::with_capacity(file, 8 * 1024)).into_response(),
        Err(err) => (StatusCode::NOT_FOUND, format!("File not found: {}", err)).into_response(),
    }
}

fn head_response(len: usize, ranges: bool) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, len.into());
    if ranges {
        headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
    }
    (headers, Body::empty()).into_response()
}

/// Ranged like `/ranged`, but every 206 body trickles out 100 bytes per 30ms.
async fn slow(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    let len = state.data.len();
    if method == Method::HEAD {
        return head_response(len, true);
    }
    let range = range_of(&headers);
    state.record(&range);
    let Some((start, end)) = parse_range(&range, len) else {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    };

    let pieces: Vec<Bytes> = state.data[start..=end]
        .chunks(100)
        .map(Bytes::copy_from_slice)
        .collect();
    let body = futures::stream::iter(pieces).then(|piece| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok::<_, std::io::Error>(piece)
    });
    (StatusCode::PARTIAL_CONTENT, Body::from_stream(body)).into_response()
}

/// Advertises ranges, then answers every GET with the whole body and 200.
async fn liar(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::HEAD {
        return head_response(state.data.len(), true);
    }
    state.record(&range_of(&headers));
    state.data.to_vec().into_response()
}

/// Sends the first 10 bytes of the body and then goes silent.
async fn stalled(State(state): State<ServerState>, method: Method, headers: HeaderMap) -> Response {
    if method == Method::HEAD {
        return head_response(state.data.len(), false);
    }
    state.record(&range_of(&headers));
    let head = Bytes::copy_from_slice(&state.data[..10.min(state.data.len())]);
    let body = futures::stream::once(async move { Ok::<_, std::io::Error>(head) }).chain(futures::stream::pending());
    Body::from_stream(body).into_response()
}

async fn missing() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ranged/{name}", get(ranged).head(ranged))
        .route("/plain/{name}", get(plain))
        .route("/streamed/{name}", get(streamed))
        .route("/slow/{name}", get(slow).head(slow))
        .route("/liar/{name}", get(liar).head(liar))
        .route("/stalled/{name}", get(stalled).head(stalled))
        .route("/missing/{name}", get(missing))
        .with_state(state)
}

/// Serve on an ephemeral loopback port; returns the base URL.
pub async fn start_server(state: ServerState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
