//! Cache Client - 读缓存工具
//!
//! 两种读取策略：
//!
//! - [`CacheClient::get_or_load`] - cache-aside，未命中回源；空结果缓存为 `""`
//!   防止缓存穿透
//! - [`CacheClient::get_with_logical_expire`] - 逻辑过期，热点 key 永不在存储中
//!   过期；读到过期数据时立即返回旧值，并在重建锁保护下后台刷新，防止缓存击穿
//!
//! 订单链路不经过这里。

use crate::db::repository::RepoError;
use crate::lock::{DistributedLock, LeaseLock, LockError};
use crate::store::{LockStore, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::error::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// TTL of a cached miss
pub const CACHE_NULL_TTL: Duration = Duration::from_secs(2 * 60);

/// Lease of the rebuild lock
const REBUILD_LOCK_LEASE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Cache loader failed: {0}")]
    Loader(#[from] RepoError),
}

impl From<LockError> for CacheError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Store(e) => Self::Store(e),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Store(e) => AppError::store_unavailable(e.to_string()),
            CacheError::Payload(e) => AppError::internal(format!("Corrupt cache entry: {e}")),
            CacheError::Loader(e) => e.into(),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Logical-expire envelope stored under the hot key
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogicalEntry<T> {
    data: T,
    /// Unix millis after which the entry is stale
    expire_time: i64,
}

#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn LockStore>,
}

impl CacheClient {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, Some(ttl)).await?;
        Ok(())
    }

    /// Store without a physical TTL; staleness is judged on read
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let entry = LogicalEntry {
            data: value,
            expire_time: shared::util::now_millis() + ttl.as_millis() as i64,
        };
        self.store
            .set(key, &serde_json::to_string(&entry)?, None)
            .await?;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.store.delete(key).await?;
        Ok(())
    }

    /// Cache-aside read through `loader`
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, RepoError>>,
    {
        if let Some(raw) = self.store.get(key).await? {
            if raw.is_empty() {
                // cached miss
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        match loader().await? {
            Some(value) => {
                self.set(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store.set(key, "", Some(CACHE_NULL_TTL)).await?;
                Ok(None)
            }
        }
    }

    /// Logical-expire read.
    ///
    /// A missing key returns `None`: hot keys are expected to be preheated.
    /// A stale entry is returned as is while one caller, holding the lock
    /// `rebuild_lock`, refreshes it in the background.
    pub async fn get_with_logical_expire<T, F, Fut>(
        &self,
        key: &str,
        rebuild_lock: &str,
        ttl: Duration,
        loader: F,
    ) -> CacheResult<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, RepoError>> + Send + 'static,
    {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let entry: LogicalEntry<T> = serde_json::from_str(&raw)?;
        if entry.expire_time > shared::util::now_millis() {
            return Ok(Some(entry.data));
        }

        let lock = LeaseLock::new(self.store.clone(), rebuild_lock);
        if lock.try_acquire(Duration::ZERO, REBUILD_LOCK_LEASE).await? {
            let client = self.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                client.rebuild(&key, ttl, loader).await;
                if let Err(e) = lock.release().await {
                    tracing::warn!(key = %key, error = %e, "Failed to release cache rebuild lock");
                }
            });
        }

        Ok(Some(entry.data))
    }

    async fn rebuild<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F)
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, RepoError>>,
    {
        let result = match loader().await {
            Ok(Some(value)) => self.set_with_logical_expire(key, &value, ttl).await,
            // source row is gone
            Ok(None) => self.invalidate(key).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => tracing::debug!(key = %key, "Cache entry rebuilt"),
            Err(e) => tracing::error!(key = %key, error = %e, "Cache rebuild failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client() -> (CacheClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CacheClient::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_get_or_load_caches_hits() {
        let (cache, _) = client();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Option<String> = cache
                .get_or_load("k", Duration::from_secs(60), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("v".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value.as_deref(), Some("v"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_load_caches_misses() {
        let (cache, store) = client();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value: Option<String> = cache
                .get_or_load("missing", Duration::from_secs(60), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(value.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("missing").await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_get_or_load_propagates_loader_error() {
        let (cache, store) = client();
        let result: CacheResult<Option<String>> = cache
            .get_or_load("k", Duration::from_secs(60), || async {
                Err(RepoError::Database("down".into()))
            })
            .await;
        assert!(matches!(result, Err(CacheError::Loader(_))));
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logical_expire_fresh_and_missing() {
        let (cache, _) = client();
        let missing: Option<u32> = cache
            .get_with_logical_expire("hot", "rebuild:hot", Duration::from_secs(60), || async {
                Ok(Some(1))
            })
            .await
            .unwrap();
        assert!(missing.is_none());

        cache
            .set_with_logical_expire("hot", &7u32, Duration::from_secs(60))
            .await
            .unwrap();
        let fresh: Option<u32> = cache
            .get_with_logical_expire("hot", "rebuild:hot", Duration::from_secs(60), || async {
                Ok(Some(99))
            })
            .await
            .unwrap();
        assert_eq!(fresh, Some(7));
    }

    #[tokio::test]
    async fn test_stale_entry_served_then_rebuilt_once() {
        let (cache, _) = client();
        cache
            .set_with_logical_expire("hot", &1u32, Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            let stale: Option<u32> = cache
                .get_with_logical_expire(
                    "hot",
                    "rebuild:hot",
                    Duration::from_secs(60),
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(2u32))
                    },
                )
                .await
                .unwrap();
            assert_eq!(stale, Some(1));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rebuilt: Option<u32> = cache
            .get_with_logical_expire("hot", "rebuild:hot", Duration::from_secs(60), || async {
                Ok(None)
            })
            .await
            .unwrap();
        assert_eq!(rebuilt, Some(2));
    }
}
