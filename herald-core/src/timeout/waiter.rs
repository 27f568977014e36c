use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use herald_common::config::HeraldConfig;
use tokio::sync::oneshot;
use tracing::debug;

use super::{TimeoutScheduler, TimerHandle};

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

struct Listener<E> {
    predicate: Predicate<E>,
    tx: oneshot::Sender<Option<E>>,
    timer: Option<TimerHandle>,
}

type Listeners<E> = Arc<Mutex<HashMap<u64, Listener<E>>>>;

/// Lets handlers wait for a later event, e.g. a reply from the same user or a button press.
///
/// Each listener completes exactly once, with the first event matching its predicate or with a
/// timeout, and is removed from the set either way.
pub struct EventWaiter<E> {
    listeners: Listeners<E>,
    next_id: AtomicU64,
    scheduler: TimeoutScheduler,
    default_timeout: Duration,
}

impl<E> EventWaiter<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(scheduler: &TimeoutScheduler, default_timeout: Duration) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            scheduler: scheduler.clone(),
            default_timeout,
        }
    }

    pub fn from_config(scheduler: &TimeoutScheduler, config: &HeraldConfig) -> Self {
        Self::new(scheduler, config.waiter_default_timeout())
    }

    /// Waits for the first event matching `predicate`. Returns `None` on timeout.
    ///
    /// `timeout` falls back to the waiter's default.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Option<Duration>) -> Option<E>
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let timeout = timeout.unwrap_or(self.default_timeout);

        {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.insert(id, Listener {
                predicate: Box::new(predicate),
                tx,
                timer: None,
            });

            let expired = self.listeners.clone();
            let timer = self.scheduler.schedule(timeout, move || {
                let listener = expired.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
                if let Some(listener) = listener {
                    debug!("event listener {id} timed out");
                    let _ = listener.tx.send(None);
                }
            });

            if let Some(listener) = listeners.get_mut(&id) {
                listener.timer = Some(timer);
            }
        }

        rx.await.ok().flatten()
    }

    /// Offers `event` to every listener. Returns the number of listeners it completed.
    pub fn dispatch(&self, event: &E) -> usize {
        let matched = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            let ids = listeners
                .iter()
                .filter(|(_, l)| (l.predicate)(event))
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();

            ids.into_iter().filter_map(|id| listeners.remove(&id)).collect::<Vec<_>>()
        };

        let count = matched.len();
        for listener in matched {
            if let Some(timer) = &listener.timer {
                timer.cancel();
            }
            let _ = listener.tx.send(Some(event.clone()));
        }

        count
    }

    /// Number of listeners still waiting.
    pub fn pending(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
