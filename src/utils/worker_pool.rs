use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinError;

/// Fixed number of workers draining one shared FIFO queue.
///
/// Every worker loops: pop one item under the lock, run the job, repeat until
/// the queue is empty. `run` returns once all workers have exited.
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Results come back in completion order, not queue order.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, job: F) -> Result<Vec<R>, JoinError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send,
    {
        let n_workers = self.workers.min(items.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let results = Arc::new(Mutex::new(Vec::new()));
        let job = Arc::new(job);

        let mut handles = Vec::with_capacity(n_workers);
        for _ in 0..n_workers {
            let queue = Arc::clone(&queue);
            let results = Arc::clone(&results);
            let job = Arc::clone(&job);
            handles.push(tokio::spawn(async move {
                loop {
                    let next = match queue.lock() {
                        Ok(mut guard) => guard.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some(item) = next else { break };
                    let out = (*job)(item).await;
                    match results.lock() {
                        Ok(mut guard) => guard.push(out),
                        Err(poisoned) => poisoned.into_inner().push(out),
                    }
                }
            }));
        }

        // join barrier: every handle is awaited even if an earlier one failed
        let mut first_err = None;
        for handle in handles {
            if let Err(err) = handle.await {
                first_err.get_or_insert(err);
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        let mut guard = match results.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(std::mem::take(&mut *guard))
    }
}
