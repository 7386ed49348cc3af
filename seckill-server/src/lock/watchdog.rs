//! Reentrant lock with lease renewal (看门狗)
//!
//! Hash key `lock:{name}`, field = holder token, value = hold count.
//! The first hold starts a renewal task that re-extends the lease every
//! `lease / 3`; it stops on the last release, when the lock is found lost,
//! or when the handle is dropped.

use super::{DistributedLock, LockError, LockFactory, LockResult, acquire_with_backoff};
use crate::store::{LockStore, ReentrantRelease, keys};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lower bound on the renewal period
const MIN_RENEW_PERIOD: Duration = Duration::from_millis(10);

pub struct WatchdogLock {
    store: Arc<dyn LockStore>,
    name: String,
    key: String,
    holder: String,
    lease: Mutex<Duration>,
    watchdog: Mutex<Option<CancellationToken>>,
}

impl WatchdogLock {
    pub fn new(store: Arc<dyn LockStore>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            store,
            key: keys::lock(&name),
            name,
            holder: uuid::Uuid::new_v4().to_string(),
            lease: Mutex::new(Duration::ZERO),
            watchdog: Mutex::new(None),
        }
    }

    fn start_watchdog(&self, lease: Duration) {
        let mut slot = self.watchdog.lock();
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        tokio::spawn(renew_loop(
            self.store.clone(),
            self.name.clone(),
            self.key.clone(),
            self.holder.clone(),
            lease,
            cancel.clone(),
        ));
        *slot = Some(cancel);
    }

    fn stop_watchdog(&self) {
        if let Some(cancel) = self.watchdog.lock().take() {
            cancel.cancel();
        }
    }
}

async fn renew_loop(
    store: Arc<dyn LockStore>,
    name: String,
    key: String,
    holder: String,
    lease: Duration,
    cancel: CancellationToken,
) {
    let period = (lease / 3).max(MIN_RENEW_PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }

        match store.reentrant_renew(&key, &holder, lease).await {
            Ok(true) => tracing::trace!(lock = %name, "Lease renewed"),
            Ok(false) => {
                tracing::warn!(lock = %name, "Lock lost before release, watchdog stopping");
                break;
            }
            // transient; the remaining lease covers the next attempt
            Err(e) => tracing::warn!(lock = %name, error = %e, "Lease renewal failed"),
        }
    }
}

#[async_trait]
impl DistributedLock for WatchdogLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, wait: Duration, lease: Duration) -> LockResult<bool> {
        let acquired = acquire_with_backoff(&self.name, wait, move || async move {
            self.store
                .reentrant_acquire(&self.key, &self.holder, lease)
                .await
                .map_err(LockError::from)
        })
        .await?;

        if acquired {
            *self.lease.lock() = lease;
            self.start_watchdog(lease);
        }
        Ok(acquired)
    }

    async fn release(&self) -> LockResult<bool> {
        let lease = *self.lease.lock();
        let outcome = self
            .store
            .reentrant_release(&self.key, &self.holder, lease)
            .await?;

        match outcome {
            ReentrantRelease::StillHeld(holds) => {
                tracing::trace!(lock = %self.name, holds, "Reentrant hold released");
                Ok(true)
            }
            ReentrantRelease::Released => {
                self.stop_watchdog();
                Ok(true)
            }
            ReentrantRelease::NotHeld => {
                self.stop_watchdog();
                tracing::warn!(lock = %self.name, "Lock was no longer owned at release");
                Ok(false)
            }
        }
    }
}

impl Drop for WatchdogLock {
    fn drop(&mut self) {
        if let Some(cancel) = self.watchdog.get_mut().take() {
            cancel.cancel();
        }
    }
}

pub struct WatchdogLockFactory {
    store: Arc<dyn LockStore>,
}

impl WatchdogLockFactory {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }
}

impl LockFactory for WatchdogLockFactory {
    fn lock(&self, name: &str) -> Box<dyn DistributedLock> {
        Box::new(WatchdogLock::new(self.store.clone(), name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_reentrant_holds() {
        let store = Arc::new(MemoryStore::new());
        let lock = WatchdogLock::new(store.clone(), "order:5");
        let other = WatchdogLock::new(store, "order:5");
        let lease = Duration::from_secs(5);

        assert!(lock.try_acquire(Duration::ZERO, lease).await.unwrap());
        assert!(lock.try_acquire(Duration::ZERO, lease).await.unwrap());

        assert!(lock.release().await.unwrap());
        assert!(!other.try_acquire(Duration::ZERO, lease).await.unwrap());

        assert!(lock.release().await.unwrap());
        assert!(other.try_acquire(Duration::ZERO, lease).await.unwrap());
        assert!(!lock.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_watchdog_keeps_lock_past_lease() {
        let store = Arc::new(MemoryStore::new());
        let lock = WatchdogLock::new(store.clone(), "order:6");
        let other = WatchdogLock::new(store, "order:6");

        assert!(
            lock.try_acquire(Duration::ZERO, Duration::from_millis(60))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            !other
                .try_acquire(Duration::ZERO, Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert!(lock.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_lets_lease_lapse() {
        let store = Arc::new(MemoryStore::new());
        {
            let lock = WatchdogLock::new(store.clone(), "order:7");
            assert!(
                lock.try_acquire(Duration::ZERO, Duration::from_millis(60))
                    .await
                    .unwrap()
            );
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        let other = WatchdogLock::new(store, "order:7");
        assert!(
            other
                .try_acquire(Duration::ZERO, Duration::from_secs(5))
                .await
                .unwrap()
        );
    }
}
