//! Window-bounded, coalescing async actions.
//!
//! A [`ThrottledAction`] runs its wrapped action at most once per window.
//! Callers arriving while a run is in flight (or within the window of a
//! completed run) observe that run's result. A failed run invalidates
//! the window so the next caller re-attempts. The action itself executes
//! on a spawned task, so a caller walking away never cancels work other
//! callers are waiting on.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::errors::{Error, Result};

type SharedResult<T> = std::result::Result<T, Arc<Error>>;
type SharedFuture<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

struct InFlight<T> {
    started_at: Instant,
    failed: Arc<AtomicBool>,
    shared: SharedFuture<T>,
}

pub struct ThrottledAction<T> {
    window: Duration,
    state: Mutex<Option<InFlight<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ThrottledAction<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(None),
        }
    }

    /// Joins the current run if one is live, otherwise starts a new one
    /// from `make`.
    pub async fn run<F, Fut>(&self, make: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut state = self.state.lock().await;
            let live = state.as_ref().and_then(|inflight| {
                let within_window = inflight.started_at.elapsed() < self.window;
                let usable = within_window && !inflight.failed.load(Ordering::SeqCst);
                usable.then(|| inflight.shared.clone())
            });
            match live {
                Some(shared) => shared,
                None => {
                    let inflight = Self::launch(make());
                    let shared = inflight.shared.clone();
                    *state = Some(inflight);
                    shared
                }
            }
        };
        shared.await.map_err(Error::from)
    }

    fn launch<Fut>(action: Fut) -> InFlight<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let failed = Arc::new(AtomicBool::new(false));
        let failed_mark = failed.clone();
        let (tx, rx) = oneshot::channel::<SharedResult<T>>();
        tokio::spawn(async move {
            let result = action.await;
            if result.is_err() {
                failed_mark.store(true, Ordering::SeqCst);
            }
            let _ = tx.send(result.map_err(Arc::new));
        });
        let shared = async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(Arc::new(Error::Unexpected(
                    "shared action dropped before completion".to_string(),
                ))),
            }
        }
        .boxed()
        .shared();
        InFlight {
            started_at: Instant::now(),
            failed,
            shared,
        }
    }
}

/// Keyed family of throttled actions sharing one window, created lazily
/// per key. Backs the per-(pair, granularity) histo refresh.
pub struct ThrottleMap<K, T> {
    window: Duration,
    entries: StdMutex<HashMap<K, Arc<ThrottledAction<T>>>>,
}

impl<K, T> ThrottleMap<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: StdMutex::new(HashMap::new()),
        }
    }

    pub fn entry(&self, key: &K) -> Arc<ThrottledAction<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ThrottledAction::new(self.window)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_action(
        calls: &Arc<AtomicUsize>,
        result: Result<u32>,
    ) -> impl Future<Output = Result<u32>> + Send + 'static {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            result
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_run() {
        let throttle = Arc::new(ThrottledAction::new(Duration::from_secs(900)));
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let throttle = throttle.clone();
            let calls = calls.clone();
            tokio::spawn(async move { throttle.run(|| counting_action(&calls, Ok(7))).await })
        };
        let b = {
            let throttle = throttle.clone();
            let calls = calls.clone();
            tokio::spawn(async move { throttle.run(|| counting_action(&calls, Ok(7))).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), 7);
        assert_eq!(b.await.unwrap().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_triggers_a_new_run() {
        let throttle = ThrottledAction::new(Duration::from_secs(900));
        let calls = Arc::new(AtomicUsize::new(0));

        throttle
            .run(|| counting_action(&calls, Ok(1)))
            .await
            .unwrap();
        throttle
            .run(|| counting_action(&calls, Ok(2)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(901)).await;
        let value = throttle
            .run(|| counting_action(&calls, Ok(3)))
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_run_is_not_cached() {
        let throttle = ThrottledAction::new(Duration::from_secs(900));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = throttle
            .run(|| counting_action(&calls, Err(Error::Unexpected("boom".to_string()))))
            .await;
        assert!(first.is_err());

        let second = throttle
            .run(|| counting_action(&calls, Ok(9)))
            .await
            .unwrap();
        assert_eq!(second, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_cancelled_caller_does_not_cancel_the_run() {
        let throttle = Arc::new(ThrottledAction::new(Duration::from_secs(900)));
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let finished_mark = finished.clone();
        let first = {
            let throttle = throttle.clone();
            tokio::spawn(async move {
                throttle
                    .run(move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished_mark.store(true, Ordering::SeqCst);
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        first.abort();

        // The action keeps running on its own task; a later caller within
        // the window observes its result without a re-run.
        let value = throttle
            .run(|| counting_action(&calls, Ok(99)))
            .await
            .unwrap();
        assert_eq!(value, 1);
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_throttle_independently() {
        let map: ThrottleMap<&'static str, u32> = ThrottleMap::new(Duration::from_secs(900));
        let calls = Arc::new(AtomicUsize::new(0));

        map.entry(&"a")
            .run(|| counting_action(&calls, Ok(1)))
            .await
            .unwrap();
        map.entry(&"b")
            .run(|| counting_action(&calls, Ok(2)))
            .await
            .unwrap();
        map.entry(&"a")
            .run(|| counting_action(&calls, Ok(3)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
