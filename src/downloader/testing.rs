//! In-memory [`HttpSource`] with scripted failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use crate::downloader::planer::ChunkRange;
use crate::error::TransportError;
use crate::http::{GetResponse, HeadInfo, HttpSource};

/// Failure key for requests without a Range header.
pub(crate) const WHOLE: u64 = u64::MAX;

pub(crate) fn content(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i * 31 % 251) as u8).collect()
}

#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Status(u16),
    Transport,
    Timeout,
    /// Send this many bytes, then error the stream.
    ResetAfter(usize),
    /// Send this many bytes, then end the stream cleanly.
    EndAfter(usize),
    /// Send this many bytes, then never yield again.
    StallAfter(usize),
}

pub(crate) struct FakeSource {
    content: Vec<u8>,
    accept_ranges: bool,
    advertise_length: bool,
    ignore_ranges: bool,
    head_status: u16,
    piece: usize,
    pacing: Option<Duration>,
    etag: Option<String>,
    scripted: Mutex<HashMap<u64, VecDeque<Failure>>>,
    always: Mutex<HashMap<u64, Failure>>,
    delays: Mutex<HashMap<u64, Duration>>,
    requests: Mutex<Vec<Option<ChunkRange>>>,
}

impl FakeSource {
    pub(crate) fn new(content: Vec<u8>) -> Self {
        FakeSource {
            content,
            accept_ranges: true,
            advertise_length: true,
            ignore_ranges: false,
            head_status: 200,
            piece: 7,
            pacing: None,
            etag: Some("\"v1\"".to_string()),
            scripted: Mutex::new(HashMap::new()),
            always: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn without_ranges(mut self) -> Self {
        self.accept_ranges = false;
        self
    }

    pub(crate) fn without_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    /// Advertise ranges but answer every GET with the whole body and 200.
    pub(crate) fn ignoring_ranges(mut self) -> Self {
        self.ignore_ranges = true;
        self
    }

    /// Wait `pace` before every body piece.
    pub(crate) fn with_pacing(mut self, pace: Duration) -> Self {
        self.pacing = Some(pace);
        self
    }

    pub(crate) fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub(crate) fn with_head_status(mut self, status: u16) -> Self {
        self.head_status = status;
        self
    }

    /// Failures consumed one per request for the range starting at `key`.
    pub(crate) fn script(&self, key: u64, failures: Vec<Failure>) {
        self.scripted.lock().unwrap().insert(key, failures.into());
    }

    pub(crate) fn fail_always(&self, key: u64, failure: Failure) {
        self.always.lock().unwrap().insert(key, failure);
    }

    pub(crate) fn delay(&self, key: u64, delay: Duration) {
        self.delays.lock().unwrap().insert(key, delay);
    }

    pub(crate) fn requests(&self) -> Vec<Option<ChunkRange>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_failure(&self, key: u64) -> Option<Failure> {
        if let Some(f) = self.always.lock().unwrap().get(&key) {
            return Some(f.clone());
        }
        self.scripted
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
    }
}

impl HttpSource for FakeSource {
    async fn head(&self, _url: &str) -> Result<HeadInfo, TransportError> {
        Ok(HeadInfo {
            status: self.head_status,
            content_length: self.advertise_length.then_some(self.content.len() as u64),
            accept_ranges: self.accept_ranges.then(|| "bytes".to_string()),
            etag: self.etag.clone(),
            last_modified: None,
        })
    }

    async fn get(&self, _url: &str, range: Option<&ChunkRange>) -> Result<GetResponse, TransportError> {
        self.requests.lock().unwrap().push(range.copied());
        let key = range.map_or(WHOLE, |r| r.start);

        let delay = self.delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (status, payload) = match range {
            Some(r) if !self.ignore_ranges => {
                let end = (r.end as usize + 1).min(self.content.len());
                (206, self.content[r.start as usize..end].to_vec())
            }
            _ => (200, self.content.clone()),
        };

        let mut reset = false;
        let mut stall = false;
        let (status, payload) = match self.next_failure(key) {
            None => (status, payload),
            Some(Failure::Status(code)) => (code, Vec::new()),
            Some(Failure::Transport) => {
                return Err(TransportError::Connect("connection reset".into()));
            }
            Some(Failure::Timeout) => return Err(TransportError::Timeout),
            Some(Failure::ResetAfter(n)) => {
                reset = true;
                (status, payload[..n.min(payload.len())].to_vec())
            }
            Some(Failure::EndAfter(n)) => (status, payload[..n.min(payload.len())].to_vec()),
            Some(Failure::StallAfter(n)) => {
                stall = true;
                (status, payload[..n.min(payload.len())].to_vec())
            }
        };

        let mut items: Vec<Result<Bytes, TransportError>> = payload
            .chunks(self.piece)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if reset {
            items.push(Err(TransportError::Other("stream reset".into())));
        }

        let mut body = futures::stream::iter(items).boxed();
        if let Some(pace) = self.pacing {
            body = body
                .then(move |item| async move {
                    tokio::time::sleep(pace).await;
                    item
                })
                .boxed();
        }
        if stall {
            body = body.chain(futures::stream::pending()).boxed();
        }
        Ok(GetResponse { status, body })
    }
}
