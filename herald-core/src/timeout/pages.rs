use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use herald_common::config::HeraldConfig;

use super::{Timeout, TimeoutScheduler};

/// What the host should do with a paged message once its session expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutAction {
    /// Remove the message (or its navigation controls) entirely.
    #[default]
    Dismiss,
    /// Keep showing the last page, without navigation.
    LeaveVisible,
}

struct PageState<T> {
    pages: Vec<T>,
    index: usize,
    closed: bool,
}

/// A navigable sequence of pages, e.g. a long help listing split across messages.
///
/// Rendering is up to the host; the session only tracks the current page. With an expiry set, every
/// interaction restarts the timeout, and the session closes once it runs out.
pub struct PageSession<T> {
    state: Arc<Mutex<PageState<T>>>,
    timeout: Option<Timeout>,
}

impl<T> PageSession<T>
where
    T: Clone + Send + 'static,
{
    /// A session that never expires.
    pub fn new(pages: Vec<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState {
                pages,
                index: 0,
                closed: false,
            })),
            timeout: None,
        }
    }

    /// A session that closes after `expiry` without interaction, then calls `on_expire` with
    /// `action`.
    pub fn with_expiry<F>(
        pages: Vec<T>,
        scheduler: &TimeoutScheduler,
        expiry: Duration,
        action: TimeoutAction,
        on_expire: F,
    ) -> Self
    where
        F: Fn(TimeoutAction) + Send + Sync + 'static,
    {
        let mut session = Self::new(pages);
        let timeout = Timeout::new(scheduler, expiry);

        let state = session.state.clone();
        // a fresh timeout has no callback yet
        let _ = timeout.on_timeout(move || {
            state.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
            on_expire(action);
        });

        timeout.start();
        session.timeout = Some(timeout);
        session
    }

    /// Uses the configured default expiry; sessions never expire if it is zero.
    pub fn from_config<F>(
        pages: Vec<T>,
        scheduler: &TimeoutScheduler,
        config: &HeraldConfig,
        action: TimeoutAction,
        on_expire: F,
    ) -> Self
    where
        F: Fn(TimeoutAction) + Send + Sync + 'static,
    {
        match config.pages_default_timeout() {
            Some(expiry) => Self::with_expiry(pages, scheduler, expiry, action, on_expire),
            None => Self::new(pages),
        }
    }

    fn navigate(&self, f: impl FnOnce(usize, usize) -> Option<usize>) -> Option<T> {
        let page = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed || state.pages.is_empty() {
                return None;
            }

            let index = f(state.index, state.pages.len())?;
            state.index = index;
            state.pages[index].clone()
        };

        if let Some(timeout) = &self.timeout {
            timeout.restart();
        }

        Some(page)
    }

    /// The current page, without counting as an interaction.
    pub fn current(&self) -> Option<T> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return None;
        }
        state.pages.get(state.index).cloned()
    }

    /// Moves one page forward, staying on the last page.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Option<T> {
        self.navigate(|index, len| Some((index + 1).min(len - 1)))
    }

    /// Moves one page back, staying on the first page.
    pub fn previous(&self) -> Option<T> {
        self.navigate(|index, _| Some(index.saturating_sub(1)))
    }

    pub fn first(&self) -> Option<T> {
        self.navigate(|_, _| Some(0))
    }

    pub fn last(&self) -> Option<T> {
        self.navigate(|_, len| Some(len - 1))
    }

    /// Jumps to a zero-based page. Out of range pages leave the session where it is.
    pub fn goto(&self, page: usize) -> Option<T> {
        self.navigate(|_, len| (page < len).then_some(page))
    }

    pub fn index(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).index
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the session early. The expiry callback is not called.
    pub fn close(&self) {
        if let Some(timeout) = &self.timeout {
            timeout.stop();
        }
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::sleep;

    use super::*;

    fn pages() -> Vec<&'static str> {
        vec!["one", "two", "three"]
    }

    #[test]
    fn navigation() {
        let session = PageSession::new(pages());

        assert_eq!(session.current(), Some("one"));
        assert_eq!(session.previous(), Some("one"));
        assert_eq!(session.next(), Some("two"));
        assert_eq!(session.last(), Some("three"));
        assert_eq!(session.next(), Some("three"));
        assert_eq!(session.first(), Some("one"));
        assert_eq!(session.goto(1), Some("two"));
        assert_eq!(session.goto(7), None);
        assert_eq!(session.index(), 1);

        session.close();
        assert!(session.is_closed());
        assert_eq!(session.next(), None);
    }

    #[test]
    fn empty_session() {
        let session = PageSession::<String>::new(Vec::new());
        assert!(session.is_empty());
        assert_eq!(session.next(), None);
        assert_eq!(session.current(), None);
    }

    #[tokio::test]
    async fn expiry_restarts_on_interaction() {
        let scheduler = TimeoutScheduler::new();
        let expired = Arc::new(Mutex::new(Vec::new()));

        let session = {
            let expired = expired.clone();
            PageSession::with_expiry(
                pages(),
                &scheduler,
                Duration::from_millis(60),
                TimeoutAction::LeaveVisible,
                move |action| expired.lock().unwrap().push(action),
            )
        };

        sleep(Duration::from_millis(40)).await;
        assert_eq!(session.next(), Some("two"));
        sleep(Duration::from_millis(40)).await;
        assert!(!session.is_closed());

        sleep(Duration::from_millis(60)).await;
        assert!(session.is_closed());
        assert_eq!(*expired.lock().unwrap(), vec![TimeoutAction::LeaveVisible]);
        assert_eq!(session.current(), None);
    }

    #[tokio::test]
    async fn closing_early_skips_callback() {
        let scheduler = TimeoutScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let session = {
            let calls = calls.clone();
            PageSession::with_expiry(
                pages(),
                &scheduler,
                Duration::from_millis(20),
                TimeoutAction::Dismiss,
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        session.close();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn config_can_disable_expiry() {
        let mut config = HeraldConfig::default();
        config.timeouts.pages_default_secs = 0;

        let scheduler = TimeoutScheduler::new();
        let session = PageSession::from_config(pages(), &scheduler, &config, TimeoutAction::Dismiss, |_| {});
        assert_eq!(session.last(), Some("three"));
        assert!(!session.is_closed());
    }
}
