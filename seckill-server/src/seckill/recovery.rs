//! Recovery Sweeper - pending 列表回放
//!
//! Replays this consumer's delivered-but-unacknowledged entries, oldest
//! first. A failing entry is retried after the backoff until it resolves, so
//! a down store never turns into a hot loop. An entry whose user lock is held
//! elsewhere is stepped over for the pass and left pending for the next sweep.

use super::error::SeckillError;
use super::processor::OrderProcessor;
use super::queue::OrderQueue;
use super::worker::{StateCell, WorkerState, WorkerStats};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RecoverySweeper {
    queue: OrderQueue,
    processor: Arc<OrderProcessor>,
    backoff: Duration,
    state: StateCell,
    stats: Arc<WorkerStats>,
}

impl RecoverySweeper {
    pub(crate) fn new(
        queue: OrderQueue,
        processor: Arc<OrderProcessor>,
        backoff: Duration,
        state: StateCell,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            queue,
            processor,
            backoff,
            state,
            stats,
        }
    }

    /// Drain the backlog. Returns how many entries were resolved.
    ///
    /// Ends once every pending entry is resolved or skipped on a lock miss.
    /// Stops early on shutdown; the remaining entries stay pending.
    pub async fn drain(&self, shutdown: &CancellationToken) -> usize {
        let mut resolved = 0;
        let mut skipped = 0;
        // entries up to here missed their lock this pass
        let mut cursor: Option<String> = None;

        while !shutdown.is_cancelled() {
            self.state.send_replace(WorkerState::Recovering);

            let entry = match self.queue.read_backlog(cursor.as_deref()).await {
                Ok(entries) => match entries.into_iter().next() {
                    Some(entry) => entry,
                    None => break,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Backlog read failed");
                    if !self.pause(shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            match self.processor.process(&entry).await {
                Ok(outcome) => {
                    self.stats.record_recovered();
                    resolved += 1;
                    tracing::debug!(entry_id = %entry.id, ?outcome, "Backlog entry resolved");
                }
                Err(SeckillError::LockUnavailable(_)) => {
                    skipped += 1;
                    cursor = Some(entry.id);
                }
                Err(e) => {
                    tracing::warn!(
                        entry_id = %entry.id,
                        error = %e,
                        "Backlog replay failed, retrying"
                    );
                    if !self.pause(shutdown).await {
                        break;
                    }
                }
            }
        }

        if resolved > 0 || skipped > 0 {
            tracing::info!(resolved, skipped, "Backlog drained");
        }
        resolved
    }

    /// Sleep for the backoff. Returns `false` if shut down meanwhile.
    async fn pause(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.backoff) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::voucher::{self, tests::sample};
    use crate::lock::{LockKind, factory};
    use crate::seckill::processor::user_lock_name;
    use crate::seckill::{OrderMessage, SqliteOrderStore};
    use crate::store::MemoryStore;
    use tokio::sync::watch;

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: OrderQueue,
        sweeper: RecoverySweeper,
        stats: Arc<WorkerStats>,
        db: DbService,
        voucher_id: i64,
    }

    async fn fixture(stock: i64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let db = DbService::in_memory().await.unwrap();
        let voucher_id = voucher::create_seckill_voucher(&db.pool, &sample(stock))
            .await
            .unwrap()
            .voucher
            .id;

        let queue = OrderQueue::new(store.clone(), "stream.orders", "g1", "c1");
        queue.ensure_group().await.unwrap();

        let (state, _) = watch::channel(WorkerState::Idle);
        let state = Arc::new(state);
        let stats = Arc::new(WorkerStats::default());
        let processor = Arc::new(OrderProcessor::new(
            queue.clone(),
            factory(LockKind::Lease, store.clone()),
            Arc::new(SqliteOrderStore::new(db.pool.clone())),
            Duration::ZERO,
            Duration::from_secs(30),
            state.clone(),
            stats.clone(),
        ));
        let sweeper = RecoverySweeper::new(
            queue.clone(),
            processor,
            Duration::from_millis(20),
            state,
            stats.clone(),
        );

        Fixture {
            store,
            queue,
            sweeper,
            stats,
            db,
            voucher_id,
        }
    }

    /// Deliver entries without processing them, as if the worker died
    async fn strand(f: &Fixture, users: &[i64]) {
        for &user_id in users {
            f.queue
                .publish(&OrderMessage {
                    voucher_id: f.voucher_id,
                    user_id,
                    order_id: 1000 + user_id,
                })
                .await
                .unwrap();
        }
        for _ in users {
            assert_eq!(f.queue.read_live(Duration::ZERO).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_drain_empty_backlog() {
        let f = fixture(1).await;
        assert_eq!(f.sweeper.drain(&CancellationToken::new()).await, 0);
    }

    #[tokio::test]
    async fn test_drain_resolves_every_pending_entry() {
        let f = fixture(5).await;
        strand(&f, &[1, 2, 3]).await;
        assert_eq!(f.queue.pending_count().await.unwrap(), 3);

        assert_eq!(f.sweeper.drain(&CancellationToken::new()).await, 3);
        assert_eq!(f.queue.pending_count().await.unwrap(), 0);
        assert_eq!(voucher::stock_of(&f.db.pool, f.voucher_id).await.unwrap(), Some(2));
        assert_eq!(f.stats.snapshot().recovered, 3);
    }

    #[tokio::test]
    async fn test_drain_steps_over_locked_user() {
        let f = fixture(5).await;
        strand(&f, &[1, 2]).await;

        // user 1's lock is held by another worker for the whole pass
        let held = factory(LockKind::Lease, f.store.clone()).lock(&user_lock_name(1));
        assert!(
            held.try_acquire(Duration::ZERO, Duration::from_secs(30))
                .await
                .unwrap()
        );

        assert_eq!(f.sweeper.drain(&CancellationToken::new()).await, 1);
        assert_eq!(f.stats.snapshot().lock_misses, 1);
        assert_eq!(f.queue.pending_count().await.unwrap(), 1);
        assert_eq!(voucher::stock_of(&f.db.pool, f.voucher_id).await.unwrap(), Some(4));

        let left = f.queue.read_backlog(None).await.unwrap();
        assert_eq!(OrderMessage::try_from(&left[0]).unwrap().user_id, 1);
    }

    #[tokio::test]
    async fn test_next_pass_picks_up_expired_lease() {
        let f = fixture(5).await;
        strand(&f, &[7]).await;

        // crashed holder: lock taken, never released
        let crashed = factory(LockKind::Lease, f.store.clone()).lock(&user_lock_name(7));
        assert!(
            crashed
                .try_acquire(Duration::ZERO, Duration::from_millis(150))
                .await
                .unwrap()
        );

        assert_eq!(f.sweeper.drain(&CancellationToken::new()).await, 0);
        assert_eq!(f.queue.pending_count().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.sweeper.drain(&CancellationToken::new()).await, 1);
        assert_eq!(f.queue.pending_count().await.unwrap(), 0);
        assert_eq!(voucher::stock_of(&f.db.pool, f.voucher_id).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_drain_honours_shutdown() {
        let f = fixture(5).await;
        strand(&f, &[8]).await;

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert_eq!(f.sweeper.drain(&shutdown).await, 0);
        assert_eq!(f.queue.pending_count().await.unwrap(), 1);
    }
}
