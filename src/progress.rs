//! Byte progress shared by every worker of one download.

use std::sync::{Arc, Mutex};

/// Called with `(delta, bytes_done, total)` after every increment.
pub type ProgressObserver = Arc<dyn Fn(u64, u64, u64) + Send + Sync>;

/// Point-in-time copy of the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub bytes_done: u64,
    pub total: u64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.bytes_done as f64 * 100.0 / self.total as f64
        }
    }
}

struct Inner {
    bytes_done: u64,
    total: u64,
}

/// One mutex guards the counter; `add` is the only mutation during a run.
pub struct ProgressState {
    inner: Mutex<Inner>,
    observer: Option<ProgressObserver>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressState")
            .field("snapshot", &self.snapshot())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl ProgressState {
    pub fn new() -> Self {
        ProgressState {
            inner: Mutex::new(Inner {
                bytes_done: 0,
                total: 0,
            }),
            observer: None,
        }
    }

    pub fn with_observer(observer: ProgressObserver) -> Self {
        ProgressState {
            observer: Some(observer),
            ..Self::new()
        }
    }

    /// Zero the counter and record the expected total for a new run.
    pub fn reset(&self, total: u64) {
        let mut inner = self.lock();
        inner.bytes_done = 0;
        inner.total = total;
    }

    pub fn add(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut inner = self.lock();
        inner.bytes_done += n;
        if let Some(observer) = &self.observer {
            observer(n, inner.bytes_done, inner.total);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.lock();
        ProgressSnapshot {
            bytes_done: inner.bytes_done,
            total: inner.total,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
