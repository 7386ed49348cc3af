//! Shared Store - 共享 KV 存储抽象
//!
//! 秒杀链路依赖的所有共享状态（库存计数、已购集合、订单流、分布式锁、缓存）
//! 都通过这里的能力 trait 访问：
//!
//! - [`KvStore`] - 字符串读写、条件写入、自增
//! - [`LockStore`] - 归属校验释放、可重入锁脚本
//! - [`AdmissionStore`] - 原子准入脚本（库存 + 一人一单 + 入队）
//! - [`StreamStore`] - 持久化日志 + 消费者组
//!
//! 两个实现：[`RedisStore`]（生产）与 [`MemoryStore`]（单进程开发与测试）。

pub mod keys;
mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Wrong value type at key {0}")]
    WrongType(String),

    #[error("No consumer group {group} on stream {stream}")]
    NoGroup { stream: String, group: String },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// An entry delivered from a stream, keyed by the id the log assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Where a consumer-group read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom<'a> {
    /// Entries never delivered to the group (`>`); waits up to `block` for one.
    /// A zero duration does not block.
    New { block: Duration },
    /// This consumer's delivered-but-unacknowledged entries, oldest first.
    /// `after` pages past an entry id (`XREADGROUP ... <id>`); `None` starts at `0`.
    Pending { after: Option<&'a str> },
}

/// Result of the atomic admission script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    OutOfStock,
    AlreadyPurchased,
}

impl Admission {
    /// Decode the script's integer reply
    pub fn from_code(code: i64) -> StoreResult<Self> {
        match code {
            0 => Ok(Self::Admitted),
            1 => Ok(Self::OutOfStock),
            2 => Ok(Self::AlreadyPurchased),
            other => Err(StoreError::Protocol(format!(
                "unexpected admission reply {other}"
            ))),
        }
    }
}

/// Result of releasing one hold on a reentrant lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReentrantRelease {
    /// The holder did not own the lock (expired or never acquired)
    NotHeld,
    /// Still held with this many remaining holds
    StillHeld(u32),
    /// Last hold released, key deleted
    Released,
}

impl ReentrantRelease {
    pub fn from_code(code: i64) -> Self {
        match code {
            c if c < 0 => Self::NotHeld,
            0 => Self::Released,
            c => Self::StillHeld(u32::try_from(c).unwrap_or(u32::MAX)),
        }
    }
}

/// Plain key/value operations
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Overwrite `key`; `ttl = None` keeps it forever
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// `SET key value NX PX ttl`
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Atomic increment by one, creating the key at 0 first
    async fn incr(&self, key: &str) -> StoreResult<i64>;
}

/// Lock primitives that need server-side atomicity
#[async_trait]
pub trait LockStore: KvStore {
    /// Delete `key` only if it still holds `token`
    async fn release_if_owner(&self, key: &str, token: &str) -> StoreResult<bool>;

    /// Take (or re-enter) a hash lock for `holder` and reset its lease
    async fn reentrant_acquire(&self, key: &str, holder: &str, lease: Duration)
    -> StoreResult<bool>;

    async fn reentrant_release(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> StoreResult<ReentrantRelease>;

    /// Extend the lease if `holder` still owns the lock
    async fn reentrant_renew(&self, key: &str, holder: &str, lease: Duration) -> StoreResult<bool>;
}

/// The atomic admission step
#[async_trait]
pub trait AdmissionStore: KvStore {
    /// Seed the admission-side stock counter for a voucher
    async fn preload_stock(&self, voucher_id: i64, stock: i64) -> StoreResult<()> {
        self.set(&keys::seckill_stock(voucher_id), &stock.to_string(), None)
            .await
    }

    /// Add users to the voucher's purchased set (`SADD`)
    async fn mark_purchased(&self, voucher_id: i64, user_ids: &[i64]) -> StoreResult<()>;

    /// Stock check, duplicate check and enqueue as one indivisible unit
    async fn admit(
        &self,
        stream: &str,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> StoreResult<Admission>;
}

/// Durable log with consumer-group semantics
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Create `group` on `stream` (creating the stream too) starting at the
    /// beginning of the log. Returns `false` if the group already existed.
    async fn create_group(&self, stream: &str, group: &str) -> StoreResult<bool>;

    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> StoreResult<String>;

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom<'_>,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> StoreResult<u64>;

    /// Number of delivered-but-unacknowledged entries across the group
    async fn pending_count(&self, stream: &str, group: &str) -> StoreResult<u64>;
}

/// Everything the server needs from its shared store
pub trait SharedStore: LockStore + AdmissionStore + StreamStore {}

impl<T: LockStore + AdmissionStore + StreamStore> SharedStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_codes() {
        assert_eq!(Admission::from_code(0).unwrap(), Admission::Admitted);
        assert_eq!(Admission::from_code(1).unwrap(), Admission::OutOfStock);
        assert_eq!(Admission::from_code(2).unwrap(), Admission::AlreadyPurchased);
        assert!(matches!(
            Admission::from_code(3),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_reentrant_release_codes() {
        assert_eq!(ReentrantRelease::from_code(-1), ReentrantRelease::NotHeld);
        assert_eq!(ReentrantRelease::from_code(0), ReentrantRelease::Released);
        assert_eq!(ReentrantRelease::from_code(2), ReentrantRelease::StillHeld(2));
    }
}
