//! Keyed single-writer queues.
//!
//! Every key gets its own FIFO drained by one Tokio task, so items for the
//! same key are handled one at a time in submission order while different
//! keys proceed in parallel. A lane that stays empty for the idle timeout
//! retires; retirement and submission take the same lock, so an item can
//! never be queued on a lane that is about to exit.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};

/// Processes the items of one lane.
#[async_trait]
pub trait LaneHandler<K, T>: Send + Sync + 'static {
    async fn handle(&self, key: &K, item: T);
}

struct LanesInner<K, T> {
    name: &'static str,
    lanes: Mutex<HashMap<K, mpsc::UnboundedSender<T>>>,
    handler: Arc<dyn LaneHandler<K, T>>,
    idle_timeout: Duration,
}

/// A set of per-key FIFO workers.
pub struct Lanes<K, T> {
    inner: Arc<LanesInner<K, T>>,
}

impl<K, T> Clone for Lanes<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> Lanes<K, T>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new(
        name: &'static str,
        handler: Arc<dyn LaneHandler<K, T>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LanesInner {
                name,
                lanes: Mutex::new(HashMap::new()),
                handler,
                idle_timeout,
            }),
        }
    }

    /// Queue `item` on `key`'s lane, starting the lane if needed.
    pub async fn submit(&self, key: K, item: T) {
        let mut lanes = self.inner.lanes.lock().await;

        let item = match lanes.get(&key) {
            Some(tx) => match tx.send(item) {
                Ok(()) => return,
                // The lane task died; start a fresh one below.
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: `rx` is alive.
        let _ = tx.send(item);
        lanes.insert(key.clone(), tx);
        tracing::trace!(lanes = self.inner.name, key = %key, "Lane started");
        tokio::spawn(run_lane(Arc::clone(&self.inner), key, rx));
    }

    /// Number of lanes currently running.
    pub async fn active(&self) -> usize {
        self.inner.lanes.lock().await.len()
    }
}

async fn run_lane<K, T>(inner: Arc<LanesInner<K, T>>, key: K, mut rx: mpsc::UnboundedReceiver<T>)
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    T: Send + 'static,
{
    loop {
        match tokio::time::timeout(inner.idle_timeout, rx.recv()).await {
            Ok(Some(item)) => {
                let handled = AssertUnwindSafe(inner.handler.handle(&key, item))
                    .catch_unwind()
                    .await;
                if handled.is_err() {
                    tracing::error!(lanes = inner.name, key = %key, "Lane handler panicked; item dropped");
                }
            }
            Ok(None) => break,
            Err(_) => {
                let mut lanes = inner.lanes.lock().await;
                if rx.is_empty() {
                    lanes.remove(&key);
                    tracing::trace!(lanes = inner.name, key = %key, "Lane retired");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Records (key, item) pairs; item 999 panics.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, u32)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl LaneHandler<String, u32> for Recorder {
        async fn handle(&self, key: &String, item: u32) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if item == 999 {
                panic!("boom");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen.lock().await.push((key.clone(), item));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..400 {
            if recorder.seen.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} items");
    }

    #[tokio::test]
    async fn same_key_is_fifo() {
        let recorder = Arc::new(Recorder::default());
        let lanes = Lanes::new("test", recorder.clone(), Duration::from_secs(60));
        for i in 0..20 {
            lanes.submit("alice".to_string(), i).await;
        }
        wait_for(&recorder, 20).await;

        let items: Vec<u32> = recorder.seen.lock().await.iter().map(|(_, i)| *i).collect();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_in_parallel() {
        let recorder = Arc::new(Recorder::default());
        let lanes = Lanes::new("test", recorder.clone(), Duration::from_secs(60));
        for key in ["a", "b", "c", "d"] {
            for i in 0..3 {
                lanes.submit(key.to_string(), i).await;
            }
        }
        wait_for(&recorder, 12).await;

        assert!(recorder.max_in_flight.load(Ordering::SeqCst) > 1);
        let seen = recorder.seen.lock().await;
        for key in ["a", "b", "c", "d"] {
            let items: Vec<u32> = seen.iter().filter(|(k, _)| k == key).map(|(_, i)| *i).collect();
            assert_eq!(items, vec![0, 1, 2], "order broken for {key}");
        }
    }

    #[tokio::test]
    async fn idle_lanes_retire_and_restart() {
        let recorder = Arc::new(Recorder::default());
        let lanes = Lanes::new("test", recorder.clone(), Duration::from_millis(30));
        lanes.submit("alice".to_string(), 1).await;
        wait_for(&recorder, 1).await;
        assert_eq!(lanes.active().await, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(lanes.active().await, 0);

        lanes.submit("alice".to_string(), 2).await;
        wait_for(&recorder, 2).await;
    }

    #[tokio::test]
    async fn panicking_item_does_not_stop_lane() {
        let recorder = Arc::new(Recorder::default());
        let lanes = Lanes::new("test", recorder.clone(), Duration::from_secs(60));
        lanes.submit("alice".to_string(), 1).await;
        lanes.submit("alice".to_string(), 999).await;
        lanes.submit("alice".to_string(), 2).await;
        wait_for(&recorder, 2).await;

        let items: Vec<u32> = recorder.seen.lock().await.iter().map(|(_, i)| *i).collect();
        assert_eq!(items, vec![1, 2]);
    }
}
