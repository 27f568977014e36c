use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;
type Lanes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

/// Runs scheduled handler invocations off the dispatching task.
///
/// Jobs submitted with the same ordering key run one after another, in submission order. Each key
/// gets a worker task (a "lane") that lives only as long as it has queued jobs. Jobs without a key
/// run concurrently.
#[derive(Clone, Default)]
pub struct OrderedExecutor {
    lanes: Lanes,
}

impl OrderedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `future`, returning a receiver for its output. The receiver errors if the future
    /// panicked.
    pub fn submit<F, T>(&self, key: Option<String>, future: F) -> oneshot::Receiver<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let out = future.await;
            let _ = tx.send(out);
        });

        match key {
            Some(key) => self.enqueue(key, job),
            None => {
                tokio::spawn(job);
            },
        }

        rx
    }

    /// Number of keys with queued or running jobs.
    pub fn active_lanes(&self) -> usize {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn enqueue(&self, key: String, job: Job) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);

        // a lane only removes itself while holding this lock, so a present sender has a live worker
        if let Some(lane) = lanes.get(&key) {
            if let Err(mpsc::error::SendError(job)) = lane.send(job) {
                warn!("ordering lane {key} closed unexpectedly, restarting it");
                lanes.remove(&key);
                drop(lanes);
                return self.enqueue(key, job);
            }
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        lanes.insert(key.clone(), tx);
        drop(lanes);

        tokio::spawn(run_lane(self.lanes.clone(), key, job, rx));
    }
}

async fn run_lane(lanes: Lanes, key: String, first: Job, mut rx: mpsc::UnboundedReceiver<Job>) {
    debug!("ordering lane {key} started");
    let mut job = first;

    loop {
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!("a job in ordering lane {key} panicked");
        }

        let next = {
            let mut lanes = lanes.lock().unwrap_or_else(PoisonError::into_inner);
            match rx.try_recv() {
                Ok(next) => Some(next),
                Err(_) => {
                    lanes.remove(&key);
                    None
                },
            }
        };

        match next {
            Some(next) => job = next,
            None => break,
        }
    }

    debug!("ordering lane {key} finished");
}
