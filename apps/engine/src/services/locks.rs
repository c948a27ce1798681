//! Per-key mutual exclusion with FIFO waiters, hold/wait metrics and a
//! safety release for holders that never let go.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStats {
    pub acquisitions: u64,
    /// Tasks currently waiting for the key.
    pub queue_depth: usize,
    pub last_wait: Duration,
    pub max_wait: Duration,
    pub last_hold: Duration,
    pub max_hold: Duration,
    pub forced_releases: u64,
}

struct KeyLock {
    // One permit; tokio's semaphore hands permits out in request order.
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
    stats: Mutex<LockStats>,
}

impl KeyLock {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            waiting: AtomicUsize::new(0),
            stats: Mutex::new(LockStats::default()),
        }
    }

    fn record_wait(&self, waited: Duration) {
        let mut stats = self.stats.lock();
        stats.acquisitions += 1;
        stats.last_wait = waited;
        stats.max_wait = stats.max_wait.max(waited);
    }

    fn record_hold(&self, held: Duration) {
        let mut stats = self.stats.lock();
        stats.last_hold = held;
        stats.max_hold = stats.max_hold.max(held);
    }
}

/// Decrements the queue depth even if the acquiring future is dropped.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct LockManager {
    keys: DashMap<String, Arc<KeyLock>>,
    hold_warn: Duration,
}

impl LockManager {
    pub fn new(hold_warn: Duration) -> Self {
        Self {
            keys: DashMap::new(),
            hold_warn,
        }
    }

    /// Join the queue for `key`. The count is taken while the map entry is
    /// held so `forget` never sees a lock with an uncounted waiter.
    fn enqueue(&self, key: &str) -> Arc<KeyLock> {
        if let Some(existing) = self.keys.get(key) {
            existing.waiting.fetch_add(1, Ordering::SeqCst);
            return existing.clone();
        }
        let entry = self
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(KeyLock::new()));
        entry.waiting.fetch_add(1, Ordering::SeqCst);
        entry.clone()
    }

    /// Wait for `key`. The permit is force-released after `timeout` if the
    /// guard is still alive by then.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, EngineError> {
        let lock = self.enqueue(key);
        let started = Instant::now();

        let permit = {
            let _queued = QueueSlot(&lock.waiting);
            lock.semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::LockClosed {
                    key: key.to_string(),
                })?
        };

        let waited = started.elapsed();
        lock.record_wait(waited);
        if !waited.is_zero() {
            debug!(key, wait_ms = waited.as_millis() as u64, "lock acquired after wait");
        }

        let held = Arc::new(Mutex::new(Some(permit)));
        let cancel = CancellationToken::new();
        tokio::spawn(safety_release(
            key.to_string(),
            lock.clone(),
            held.clone(),
            cancel.clone(),
            timeout,
        ));

        Ok(LockGuard {
            key: key.to_string(),
            lock,
            held,
            cancel,
            acquired_at: Instant::now(),
            waited,
            hold_warn: self.hold_warn,
        })
    }

    pub fn stats(&self, key: &str) -> Option<LockStats> {
        self.keys.get(key).map(|lock| {
            let mut stats = *lock.stats.lock();
            stats.queue_depth = lock.waiting.load(Ordering::SeqCst);
            stats
        })
    }

    pub fn queue_depth(&self, key: &str) -> usize {
        self.keys
            .get(key)
            .map(|lock| lock.waiting.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Drop bookkeeping for `key` if it is idle. A key that is held or has
    /// waiters is kept, so its queue order survives.
    pub fn forget(&self, key: &str) -> bool {
        let removed = self
            .keys
            .remove_if(key, |_, lock| {
                lock.waiting.load(Ordering::SeqCst) == 0 && lock.semaphore.available_permits() == 1
            })
            .is_some();
        if !removed {
            debug!(key, "lock still in use; kept");
        }
        removed
    }
}

async fn safety_release(
    key: String,
    lock: Arc<KeyLock>,
    held: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
    cancel: CancellationToken,
    timeout: Duration,
) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(timeout) => {
            let forced = held.lock().take();
            if let Some(permit) = forced {
                drop(permit);
                lock.stats.lock().forced_releases += 1;
                warn!(
                    key = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "lock holder exceeded safety timeout; permit force-released"
                );
            }
        }
    }
}

/// Releases on drop.
pub struct LockGuard {
    key: String,
    lock: Arc<KeyLock>,
    held: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
    cancel: CancellationToken,
    acquired_at: Instant,
    waited: Duration,
    hold_warn: Duration,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }

    pub fn was_force_released(&self) -> bool {
        self.held.lock().is_none()
    }

    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        let held = self.acquired_at.elapsed();
        self.lock.record_hold(held);
        if held > self.hold_warn {
            warn!(
                key = %self.key,
                hold_ms = held.as_millis() as u64,
                threshold_ms = self.hold_warn.as_millis() as u64,
                "critical section held past threshold"
            );
        }
        drop(self.held.lock().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn second_waiter_waits_at_least_the_hold() {
        let locks = Arc::new(LockManager::new(LONG));
        let first = locks.acquire("session:1", LONG).await.expect("first");

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("session:1", LONG).await.expect("second");
                guard.waited()
            })
        };
        while locks.queue_depth("session:1") == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
        first.release();

        let waited = contender.await.expect("join");
        let stats = locks.stats("session:1").expect("stats");
        assert!(waited >= Duration::from_millis(250));
        assert!(waited >= stats.max_hold);
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.queue_depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn safety_timer_frees_a_stuck_holder() {
        let locks = LockManager::new(LONG);
        let stuck = locks
            .acquire("session:2", Duration::from_millis(100))
            .await
            .expect("first");

        let next = locks
            .acquire("session:2", LONG)
            .await
            .expect("queue must not starve");
        assert!(next.waited() >= Duration::from_millis(100));
        assert!(stuck.was_force_released());
        assert_eq!(
            locks.stats("session:2").map(|s| s.forced_releases),
            Some(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_leaves_the_queue() {
        let locks = LockManager::new(LONG);
        let _held = locks.acquire("k", LONG).await.expect("held");
        let attempt = tokio::time::timeout(Duration::from_millis(10), locks.acquire("k", LONG)).await;
        assert!(attempt.is_err());
        assert_eq!(locks.queue_depth("k"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_keeps_a_key_that_is_held_or_awaited() {
        let locks = Arc::new(LockManager::new(LONG));
        let first = locks.acquire("session:5", LONG).await.expect("first");

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("session:5", LONG).await.expect("waiter");
                tokio::time::sleep(Duration::from_millis(50)).await;
                guard.release();
            })
        };
        while locks.queue_depth("session:5") == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!locks.forget("session:5"));
        let intruder =
            tokio::time::timeout(Duration::from_millis(10), locks.acquire("session:5", LONG)).await;
        assert!(intruder.is_err(), "a second holder got in while the first held");

        first.release();
        let during = tokio::time::timeout(Duration::from_millis(10), locks.acquire("session:5", LONG)).await;
        assert!(during.is_err(), "the queued waiter must hold the key next");

        waiter.await.expect("join");
        assert!(locks.forget("session:5"));
        assert!(locks.stats("session:5").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn independent_keys_do_not_block() {
        let locks = LockManager::new(LONG);
        let _a = locks.acquire("a", LONG).await.expect("a");
        let b = locks.acquire("b", LONG).await.expect("b");
        assert_eq!(b.waited(), Duration::ZERO);
    }
}
