//! Distributed Lock - 分布式互斥锁
//!
//! Named, leased, owner-tagged mutual exclusion on top of [`LockStore`].
//! Mutual exclusion is enforced by the store, never by the client.
//!
//! - [`LeaseLock`] - `SET NX PX` + 脚本校验归属后删除
//! - [`WatchdogLock`] - 可重入 hash 锁，持有期间后台自动续期
//!
//! Exponential backoff with jitter between attempts while a wait budget remains.

mod lease;
mod watchdog;

pub use lease::{LeaseLock, LeaseLockFactory};
pub use watchdog::{WatchdogLock, WatchdogLockFactory};

use crate::store::{LockStore, StoreError};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Initial backoff between attempts
const INITIAL_BACKOFF_MS: u64 = 10;
/// Backoff cap
const MAX_BACKOFF_MS: u64 = 200;

/// Lock error types
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock store error: {0}")]
    Store(#[from] StoreError),
}

pub type LockResult<T> = Result<T, LockError>;

/// Capability set shared by both lock variants
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Logical lock name (the store key is `lock:{name}`)
    fn name(&self) -> &str;

    /// Try to take the lock, retrying for at most `wait`.
    ///
    /// `wait = 0` makes a single attempt. The lock auto-expires after `lease`
    /// unless the variant renews it.
    async fn try_acquire(&self, wait: Duration, lease: Duration) -> LockResult<bool>;

    /// Release a hold. Returns `false` if this handle no longer owned the lock.
    async fn release(&self) -> LockResult<bool>;
}

/// Creates lock handles by name
pub trait LockFactory: Send + Sync {
    fn lock(&self, name: &str) -> Box<dyn DistributedLock>;
}

/// 锁实现选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// Fixed lease, no renewal
    Lease,
    /// Reentrant with automatic lease renewal
    Watchdog,
}

impl FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lease" | "simple" => Ok(Self::Lease),
            "watchdog" | "reentrant" => Ok(Self::Watchdog),
            other => Err(format!("unknown lock kind: {other}")),
        }
    }
}

/// Build the factory for `kind`
pub fn factory(kind: LockKind, store: Arc<dyn LockStore>) -> Arc<dyn LockFactory> {
    match kind {
        LockKind::Lease => Arc::new(LeaseLockFactory::new(store)),
        LockKind::Watchdog => Arc::new(WatchdogLockFactory::new(store)),
    }
}

/// Run `attempt` until it succeeds or `wait` elapses
async fn acquire_with_backoff<F, Fut>(
    name: &str,
    wait: Duration,
    mut attempt: F,
) -> LockResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LockResult<bool>>,
{
    let deadline = Instant::now() + wait;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        if attempt().await? {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        // rng must not live across the await
        let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 2);
        let sleep = Duration::from_millis(backoff_ms + jitter).min(deadline - now);
        tracing::debug!(
            lock = %name,
            backoff_ms = sleep.as_millis() as u64,
            "Lock held, backing off"
        );
        tokio::time::sleep(sleep).await;

        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}
