//! One-shot timers shared by everything that needs to expire: event waiters, paged sessions and
//! anything else a host builds on [`Timeout`].
//!
//! A single task keeps all deadlines. When one passes, its job is handed to the blocking pool so
//! that slow callbacks never hold up other timers. Every arm of a timer can end exactly once,
//! either by firing or by being cancelled, decided by a single compare-and-swap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Display;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

pub mod pages;
pub mod waiter;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

type Job = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
struct Arm(AtomicU8);

impl Arm {
    fn new() -> Self {
        Self(AtomicU8::new(ARMED))
    }

    fn transition(&self, to: u8) -> bool {
        self.0.compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn state(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// A handle to one scheduled job.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    arm: Arc<Arm>,
}

impl TimerHandle {
    /// Cancels the job. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&self) -> bool {
        self.arm.transition(CANCELLED)
    }

    pub fn is_pending(&self) -> bool {
        self.arm.state() == ARMED
    }

    pub fn has_fired(&self) -> bool {
        self.arm.state() == FIRED
    }
}

enum Message {
    Schedule {
        id: u64,
        deadline: Instant,
        arm: Arc<Arm>,
        job: Job,
    },
    Shutdown,
}

struct SchedulerInner {
    tx: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
}

/// Cheap to clone; all clones share the same timer task.
#[derive(Clone)]
pub struct TimeoutScheduler {
    inner: Arc<SchedulerInner>,
}

impl TimeoutScheduler {
    /// Spawns the timer task on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_timers(rx));

        Self {
            inner: Arc::new(SchedulerInner {
                tx,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Runs `job` on the blocking pool after `delay`, unless cancelled first.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let arm = Arc::new(Arm::new());
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let message = Message::Schedule {
            id,
            deadline: Instant::now() + delay,
            arm: arm.clone(),
            job: Box::new(job),
        };

        if self.inner.tx.send(message).is_err() {
            warn!("timer scheduled after the scheduler shut down, it will never fire");
            arm.transition(CANCELLED);
        }

        TimerHandle { arm }
    }

    /// Stops the timer task. Pending timers are dropped without firing.
    pub fn shutdown(&self) {
        let _ = self.inner.tx.send(Message::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.inner.tx.is_closed()
    }
}

async fn run_timers(mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut deadlines: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut pending: HashMap<u64, (Arc<Arm>, Job)> = HashMap::new();

    debug!("timeout scheduler started");

    loop {
        let next = deadlines.peek().map(|Reverse((deadline, _))| *deadline);
        // far enough away to never fire; the branch is disabled when nothing is pending anyway
        let wake = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(60 * 60 * 24));

        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Schedule { id, deadline, arm, job }) => {
                    deadlines.push(Reverse((deadline, id)));
                    pending.insert(id, (arm, job));
                },
                Some(Message::Shutdown) | None => break,
            },
            _ = sleep_until(wake), if next.is_some() => {
                let now = Instant::now();

                while let Some(&Reverse((deadline, id))) = deadlines.peek() {
                    if deadline > now {
                        break;
                    }
                    deadlines.pop();

                    let Some((arm, job)) = pending.remove(&id) else {
                        continue;
                    };
                    if arm.transition(FIRED) {
                        tokio::task::spawn_blocking(job);
                    }
                }

                // forget cancelled entries so they do not pile up
                pending.retain(|_, (arm, _)| arm.state() == ARMED);
                deadlines.retain(|Reverse((_, id))| pending.contains_key(id));
            },
        }
    }

    rx.close();
    for (arm, _) in pending.values() {
        arm.transition(CANCELLED);
    }
    // timers sent after the shutdown message but before the channel closed
    while let Ok(message) = rx.try_recv() {
        if let Message::Schedule { arm, .. } = message {
            arm.transition(CANCELLED);
        }
    }
    debug!("timeout scheduler stopped, dropped {} pending timers", pending.len());
}

/// Returned when a [`Timeout`] already has a completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackAlreadySet;

impl Display for CallbackAlreadySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a timeout callback was already set")
    }
}
impl std::error::Error for CallbackAlreadySet {}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// A restartable timeout with at most one completion callback.
///
/// Created disarmed. [`Timeout::start`] arms it, after which it either fires once or is stopped.
/// A disabled timeout never arms.
pub struct Timeout {
    scheduler: TimeoutScheduler,
    enabled: bool,
    callback: Arc<OnceLock<Callback>>,
    state: Mutex<TimeoutState>,
}

struct TimeoutState {
    duration: Duration,
    current: Option<TimerHandle>,
}

impl Timeout {
    pub fn new(scheduler: &TimeoutScheduler, duration: Duration) -> Self {
        Self {
            scheduler: scheduler.clone(),
            enabled: true,
            callback: Arc::new(OnceLock::new()),
            state: Mutex::new(TimeoutState {
                duration,
                current: None,
            }),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn duration(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).duration
    }

    /// Sets the completion callback. It may only be set once.
    pub fn on_timeout<F>(&self, callback: F) -> Result<(), CallbackAlreadySet>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback.set(Arc::new(callback)).map_err(|_| CallbackAlreadySet)
    }

    fn arm(&self, state: &mut TimeoutState) {
        let callback = self.callback.clone();
        state.current = Some(self.scheduler.schedule(state.duration, move || {
            if let Some(callback) = callback.get() {
                callback();
            }
        }));
    }

    /// Arms the timeout with its current duration. Does nothing if disabled or already armed.
    /// Returns whether it was armed by this call.
    pub fn start(&self) -> bool {
        if !self.enabled {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.current.as_ref().is_some_and(TimerHandle::is_pending) {
            return false;
        }

        self.arm(&mut state);
        true
    }

    /// Like [`Timeout::start`], but sets a new duration first. The duration is kept for restarts.
    pub fn start_with(&self, duration: Duration) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.current.as_ref().is_some_and(TimerHandle::is_pending) {
                return false;
            }
            state.duration = duration;
        }
        self.start()
    }

    /// Cancels the pending arm. Returns `false` if nothing was pending (never started, already
    /// fired or already stopped).
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.take().is_some_and(|handle| handle.cancel())
    }

    /// Cancels any pending arm and arms again with the same duration.
    pub fn restart(&self) -> bool {
        if !self.enabled {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.current.take() {
            handle.cancel();
        }

        self.arm(&mut state);
        true
    }

    pub fn is_armed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current.as_ref().is_some_and(TimerHandle::is_pending)
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.current.take() {
            handle.cancel();
        }
    }
}
