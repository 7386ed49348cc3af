//! Lease-token lock
//!
//! acquire: `SET lock:{name} {token} NX PX {lease}`
//! release: 脚本比较 token 后删除，避免误删他人在租约过期后获得的锁

use super::{DistributedLock, LockError, LockFactory, LockResult, acquire_with_backoff};
use crate::store::{LockStore, keys};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-lease lock owned by a random per-handle token
pub struct LeaseLock {
    store: Arc<dyn LockStore>,
    name: String,
    key: String,
    token: String,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn LockStore>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            store,
            key: keys::lock(&name),
            name,
            token: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
impl DistributedLock for LeaseLock {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_acquire(&self, wait: Duration, lease: Duration) -> LockResult<bool> {
        acquire_with_backoff(&self.name, wait, move || async move {
            self.store
                .set_if_absent(&self.key, &self.token, lease)
                .await
                .map_err(LockError::from)
        })
        .await
    }

    async fn release(&self) -> LockResult<bool> {
        let released = self.store.release_if_owner(&self.key, &self.token).await?;
        if !released {
            tracing::warn!(
                lock = %self.name,
                "Lock was no longer owned at release (lease expired?)"
            );
        }
        Ok(released)
    }
}

pub struct LeaseLockFactory {
    store: Arc<dyn LockStore>,
}

impl LeaseLockFactory {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }
}

impl LockFactory for LeaseLockFactory {
    fn lock(&self, name: &str) -> Box<dyn DistributedLock> {
        Box::new(LeaseLock::new(self.store.clone(), name))
    }
}
