//! Id Worker - 全局唯一订单 ID
//!
//! ```text
//! 63      32 31       0
//! +---------+---------+
//! | seconds | counter |
//! +---------+---------+
//! ```
//!
//! `seconds` counts from [`BEGIN_TIMESTAMP`]; `counter` is an atomic
//! increment on `icr:{business}:{yyyy:MM:dd}`, so counters reset daily and can
//! be inspected per day. Fewer than 2^32 ids per business key per second is a
//! design bound, not checked at runtime.

use super::SeckillResult;
use crate::store::{KvStore, keys};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 2023-02-01T00:00:00Z
pub const BEGIN_TIMESTAMP: i64 = 1_675_209_600;

/// Bits reserved for the per-day counter
pub const COUNT_BITS: u32 = 32;

/// Distributed monotonic id generator
#[derive(Clone)]
pub struct IdWorker {
    store: Arc<dyn KvStore>,
}

impl IdWorker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn next_id(&self, business: &str) -> SeckillResult<i64> {
        self.next_id_at(business, Utc::now()).await
    }

    /// Same as [`next_id`](Self::next_id) with an explicit clock
    pub async fn next_id_at(&self, business: &str, now: DateTime<Utc>) -> SeckillResult<i64> {
        let seconds = (now.timestamp() - BEGIN_TIMESTAMP).max(0);
        let day = now.format("%Y:%m:%d").to_string();
        let count = self.store.incr(&keys::id_counter(business, &day)).await?;
        Ok((seconds << COUNT_BITS) | count)
    }
}

/// Split an id back into (seconds since epoch constant, counter)
pub fn decompose(id: i64) -> (i64, i64) {
    (id >> COUNT_BITS, id & ((1 << COUNT_BITS) - 1))
}
