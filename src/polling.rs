//! Keyed periodic subscriptions.
//!
//! A [`Poller`] runs at most one task per key. Starting a key that is already
//! running aborts the old task before the new one is scheduled, so refresh
//! loops for the same target never pile up.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::debug;

struct Subscription {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    subscriptions: HashMap<String, Subscription>,
}

#[derive(Clone, Default)]
pub struct Poller {
    registry: Arc<Mutex<Registry>>,
}

/// Cancels the subscription it was returned for. Dropping it leaves the
/// subscription running.
#[derive(Clone)]
pub struct PollHandle {
    key: String,
    generation: u64,
    registry: Arc<Mutex<Registry>>,
}

impl PollHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stops the subscription. Does nothing if the key has since been
    /// re-subscribed or already cancelled.
    pub fn cancel(&self) {
        let mut registry = self.registry.lock();
        let current = registry
            .subscriptions
            .get(&self.key)
            .map(|s| s.generation);
        if current == Some(self.generation) {
            if let Some(sub) = registry.subscriptions.remove(&self.key) {
                sub.task.abort();
                debug!("Polling {} cancelled", self.key);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .lock()
            .subscriptions
            .get(&self.key)
            .map_or(false, |s| s.generation == self.generation && !s.task.is_finished())
    }
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `callback` every `period`, first one period from now. Any
    /// previous subscription under `key` is cancelled. A zero period only
    /// cancels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling<F, Fut>(&self, key: impl Into<String>, period: Duration, callback: F) -> PollHandle
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let mut registry = self.registry.lock();

        if let Some(previous) = registry.subscriptions.remove(&key) {
            previous.task.abort();
            debug!("Polling {} replaced", key);
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;

        if !period.is_zero() {
            let task = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    callback().await;
                }
            });
            registry
                .subscriptions
                .insert(key.clone(), Subscription { generation, task });
        }

        PollHandle {
            key,
            generation,
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn cancel(&self, key: &str) {
        if let Some(sub) = self.registry.lock().subscriptions.remove(key) {
            sub.task.abort();
        }
    }

    pub fn cancel_all(&self) {
        for (_, sub) in self.registry.lock().subscriptions.drain() {
            sub.task.abort();
        }
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.lock().subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_polls_until_cancelled() {
        let poller = Poller::new();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = poller.start_polling("global", Duration::from_millis(20), counter_callback(&count));
        assert!(handle.is_active());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        handle.cancel();
        assert!(!handle.is_active());
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_cancel = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_first_call_waits_one_period() {
        let poller = Poller::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _handle = poller.start_polling("ua-a", Duration::from_secs(60), counter_callback(&count));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        poller.cancel_all();
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous() {
        let poller = Poller::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let old = poller.start_polling("ua-a", Duration::from_millis(20), counter_callback(&first));
        let new = poller.start_polling("ua-a", Duration::from_millis(20), counter_callback(&second));
        assert_eq!(poller.active_keys(), vec!["ua-a".to_string()]);
        assert!(!old.is_active());

        // The stale handle must not cancel the replacement.
        old.cancel();
        assert!(new.is_active());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert!(second.load(Ordering::SeqCst) >= 2);
        new.cancel();
    }

    #[tokio::test]
    async fn test_zero_period_only_cancels() {
        let poller = Poller::new();
        let count = Arc::new(AtomicUsize::new(0));

        poller.start_polling("global", Duration::from_millis(20), counter_callback(&count));
        let handle = poller.start_polling("global", Duration::ZERO, counter_callback(&count));

        assert!(!handle.is_active());
        assert!(poller.active_keys().is_empty());
    }
}
