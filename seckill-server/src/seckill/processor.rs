//! Per-entry finalization protocol
//!
//! Shared by the live loop and the recovery sweeper: decode, take the
//! per-user lock, finalize inside the lock, release, acknowledge.

use super::finalizer::{FinalizeOutcome, OrderStore};
use super::queue::{OrderMessage, OrderQueue};
use super::worker::{StateCell, WorkerState, WorkerStats};
use super::{SeckillError, SeckillResult};
use crate::lock::LockFactory;
use crate::store::StreamEntry;
use shared::models::VoucherOrder;
use std::sync::Arc;
use std::time::Duration;

/// How a delivered entry was resolved. Every variant means the entry was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Order persisted and stock decremented
    Finalized,
    /// The order already existed; replay was a no-op
    Duplicate,
    /// Terminal failure, logged and discarded
    Dropped,
}

/// Lock name guarding one user's finalizations
pub fn user_lock_name(user_id: i64) -> String {
    format!("order:{user_id}")
}

pub struct OrderProcessor {
    queue: OrderQueue,
    locks: Arc<dyn LockFactory>,
    orders: Arc<dyn OrderStore>,
    lock_wait: Duration,
    lock_lease: Duration,
    state: StateCell,
    stats: Arc<WorkerStats>,
}

impl OrderProcessor {
    pub(crate) fn new(
        queue: OrderQueue,
        locks: Arc<dyn LockFactory>,
        orders: Arc<dyn OrderStore>,
        lock_wait: Duration,
        lock_lease: Duration,
        state: StateCell,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            queue,
            locks,
            orders,
            lock_wait,
            lock_lease,
            state,
            stats,
        }
    }

    /// Run the protocol for one delivered entry.
    ///
    /// `Ok` means the entry was acknowledged. `Err` leaves it pending for replay.
    pub async fn process(&self, entry: &StreamEntry) -> SeckillResult<ItemOutcome> {
        let outcome = match self.finalize_entry(entry).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_terminal() => {
                self.report_terminal(entry, &e);
                ItemOutcome::Dropped
            }
            Err(e) => {
                match &e {
                    SeckillError::LockUnavailable(lock) => {
                        self.stats.record_lock_miss();
                        tracing::warn!(
                            entry_id = %entry.id,
                            lock = %lock,
                            "User lock busy, entry left pending"
                        );
                    }
                    _ => self.stats.record_failure(),
                }
                return Err(e);
            }
        };

        self.state.send_replace(WorkerState::Acknowledging);
        if let Err(e) = self.queue.ack(&entry.id).await {
            self.stats.record_failure();
            return Err(e);
        }

        match outcome {
            ItemOutcome::Finalized => self.stats.record_finalized(),
            ItemOutcome::Duplicate => self.stats.record_duplicate(),
            ItemOutcome::Dropped => self.stats.record_dropped(),
        }
        Ok(outcome)
    }

    async fn finalize_entry(&self, entry: &StreamEntry) -> SeckillResult<ItemOutcome> {
        let message = OrderMessage::try_from(entry)?;

        self.state.send_replace(WorkerState::Locking);
        let lock = self.locks.lock(&user_lock_name(message.user_id));
        if !lock.try_acquire(self.lock_wait, self.lock_lease).await? {
            return Err(SeckillError::LockUnavailable(lock.name().to_string()));
        }
        self.state.send_replace(WorkerState::Locked);

        let result = self.finalize_locked(&message).await;

        match lock.release().await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                lock = %lock.name(),
                order_id = %message.order_id,
                "Lock lease ran out before release"
            ),
            Err(e) => tracing::warn!(
                lock = %lock.name(),
                error = %e,
                "Lock release failed, lease will expire"
            ),
        }

        result
    }

    async fn finalize_locked(&self, message: &OrderMessage) -> SeckillResult<ItemOutcome> {
        self.state.send_replace(WorkerState::Finalizing);

        let order = VoucherOrder {
            id: message.order_id,
            user_id: message.user_id,
            voucher_id: message.voucher_id,
            created_at: shared::util::now_millis(),
        };

        match self.orders.finalize(&order).await? {
            FinalizeOutcome::Created => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = order.user_id,
                    voucher_id = order.voucher_id,
                    "Order finalized"
                );
                Ok(ItemOutcome::Finalized)
            }
            FinalizeOutcome::AlreadyExists => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = order.user_id,
                    voucher_id = order.voucher_id,
                    "Order already persisted, replay ignored"
                );
                Ok(ItemOutcome::Duplicate)
            }
            FinalizeOutcome::OutOfStock => Err(SeckillError::ConsistencyViolation {
                order_id: order.id,
                user_id: order.user_id,
                voucher_id: order.voucher_id,
            }),
        }
    }

    fn report_terminal(&self, entry: &StreamEntry, error: &SeckillError) {
        match error {
            SeckillError::ConsistencyViolation {
                order_id,
                user_id,
                voucher_id,
            } => tracing::error!(
                target: "consistency",
                entry_id = %entry.id,
                order_id = %order_id,
                user_id,
                voucher_id,
                "Admitted order has no persisted stock, dropping"
            ),
            other => tracing::error!(
                entry_id = %entry.id,
                error = %other,
                "Dropping undecodable queue entry"
            ),
        }
    }
}
