//! Keyed work queue.
//!
//! A key is either queued, being processed, or both at most once: adding a
//! key that is already queued is a no-op, and adding a key that is being
//! processed defers it until [`WorkQueue::done`]. This gives at most one
//! in-flight invocation per object.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::rate::ItemBackoff;

struct Inner<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

pub struct WorkQueue<K> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
    limiter: ItemBackoff<K>,
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(limiter: ItemBackoff<K>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing work.
    pub fn add(&self, key: K) {
        let mut inner = self.lock();
        if inner.shutting_down || inner.dirty.contains(&key) {
            return;
        }
        inner.dirty.insert(key.clone());
        if inner.processing.contains(&key) {
            return;
        }
        inner.queue.push_back(key);
        drop(inner);
        self.notify.notify_one();
    }

    /// Add `key` once `delay` has passed.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add `key` after its next per-key backoff delay.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.limiter.when(&key);
        self.add_after(key, delay);
    }

    /// Reset the backoff of `key`.
    pub fn forget(&self, key: &K) {
        self.limiter.forget(key);
    }

    pub fn requeues(&self, key: &K) -> u32 {
        self.limiter.requeues(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.shutting_down {
                    return None;
                }
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    let more = !inner.queue.is_empty();
                    drop(inner);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Finish processing `key`. Requeues it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut inner = self.lock();
        inner.processing.remove(key);
        if inner.dirty.contains(key) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake all waiters and stop handing out keys.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Arc<WorkQueue<&'static str>> {
        Arc::new(WorkQueue::new(ItemBackoff::quick()))
    }

    #[tokio::test]
    async fn test_deduplicates() {
        let q = queue();
        q.add("a");
        q.add("a");
        q.add("b");
        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, Some("b"));
    }

    #[tokio::test]
    async fn test_add_while_processing_defers() {
        let q = queue();
        q.add("a");
        let key = q.get().await.unwrap();

        q.add("a");
        assert!(q.is_empty());

        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_delays() {
        let q = queue();
        q.add_after("a", Duration::from_secs(30));
        assert!(q.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(q.get().await, Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_backs_off() {
        let q = queue();
        q.add_rate_limited("a");
        q.add_rate_limited("b");
        assert_eq!(q.requeues(&"a"), 1);

        q.add_rate_limited("a");
        assert_eq!(q.requeues(&"a"), 2);
        q.forget(&"a");
        assert_eq!(q.requeues(&"a"), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(q.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shut_down();
        assert_eq!(waiter.await.unwrap(), None);

        q.add("a");
        assert!(q.is_empty());
    }
}
