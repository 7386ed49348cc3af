//! Order finalization - 订单落库
//!
//! The authoritative checks: inside one local transaction, re-check
//! uniqueness, decrement persisted stock behind a `stock > 0` guard and insert
//! the order row. Any miss rolls the whole transaction back.

use crate::db::repository::{RepoResult, voucher, voucher_order};
use async_trait::async_trait;
use shared::models::VoucherOrder;
use sqlx::SqlitePool;

/// Result of one finalization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Stock decremented and order row inserted
    Created,
    /// An order for (user, voucher) already exists; nothing changed
    AlreadyExists,
    /// Guarded decrement found no stock; nothing changed
    OutOfStock,
}

/// Persistence collaborator of the order worker
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn finalize(&self, order: &VoucherOrder) -> RepoResult<FinalizeOutcome>;

    async fn find_order(&self, user_id: i64, voucher_id: i64) -> RepoResult<Option<VoucherOrder>>;

    async fn find_by_id(&self, order_id: i64) -> RepoResult<Option<VoucherOrder>>;
}

#[derive(Clone, Debug)]
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn finalize(&self, order: &VoucherOrder) -> RepoResult<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` without commit rolls back
        if voucher_order::find_by_user_voucher(&mut *tx, order.user_id, order.voucher_id)
            .await?
            .is_some()
        {
            return Ok(FinalizeOutcome::AlreadyExists);
        }

        if !voucher::decrement_stock_if_positive(&mut *tx, order.voucher_id).await? {
            return Ok(FinalizeOutcome::OutOfStock);
        }

        if !voucher_order::insert(&mut *tx, order).await? {
            // order id or (user, voucher) landed between re-check and insert
            return Ok(FinalizeOutcome::AlreadyExists);
        }

        tx.commit().await?;
        Ok(FinalizeOutcome::Created)
    }

    async fn find_order(&self, user_id: i64, voucher_id: i64) -> RepoResult<Option<VoucherOrder>> {
        voucher_order::find_by_user_voucher(&self.pool, user_id, voucher_id).await
    }

    async fn find_by_id(&self, order_id: i64) -> RepoResult<Option<VoucherOrder>> {
        voucher_order::find_by_id(&self.pool, order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::voucher::tests::sample;

    async fn setup(stock: i64) -> (SqliteOrderStore, SqlitePool, i64) {
        let db = DbService::in_memory().await.unwrap();
        let id = voucher::create_seckill_voucher(&db.pool, &sample(stock))
            .await
            .unwrap()
            .voucher
            .id;
        (SqliteOrderStore::new(db.pool.clone()), db.pool, id)
    }

    fn order(id: i64, user_id: i64, voucher_id: i64) -> VoucherOrder {
        VoucherOrder {
            id,
            user_id,
            voucher_id,
            created_at: shared::util::now_millis(),
        }
    }

    #[tokio::test]
    async fn test_finalize_creates_once() {
        let (store, pool, voucher_id) = setup(5).await;

        assert_eq!(
            store.finalize(&order(1, 7, voucher_id)).await.unwrap(),
            FinalizeOutcome::Created
        );
        // replay of the same tuple: no second row, no second decrement
        assert_eq!(
            store.finalize(&order(1, 7, voucher_id)).await.unwrap(),
            FinalizeOutcome::AlreadyExists
        );
        // same user, different order id
        assert_eq!(
            store.finalize(&order(2, 7, voucher_id)).await.unwrap(),
            FinalizeOutcome::AlreadyExists
        );

        assert_eq!(voucher::stock_of(&pool, voucher_id).await.unwrap(), Some(4));
        assert_eq!(voucher_order::count_by_voucher(&pool, voucher_id).await.unwrap(), 1);
        assert!(store.find_order(7, voucher_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_finalize_out_of_stock_changes_nothing() {
        let (store, pool, voucher_id) = setup(1).await;

        assert_eq!(
            store.finalize(&order(1, 1, voucher_id)).await.unwrap(),
            FinalizeOutcome::Created
        );
        assert_eq!(
            store.finalize(&order(2, 2, voucher_id)).await.unwrap(),
            FinalizeOutcome::OutOfStock
        );
        assert_eq!(voucher::stock_of(&pool, voucher_id).await.unwrap(), Some(0));
        assert!(store.find_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_id_collision_rolls_back_decrement() {
        let (store, pool, voucher_id) = setup(3).await;

        store.finalize(&order(1, 1, voucher_id)).await.unwrap();
        // same order id, different user: insert conflicts on the primary key
        assert_eq!(
            store.finalize(&order(1, 2, voucher_id)).await.unwrap(),
            FinalizeOutcome::AlreadyExists
        );
        assert_eq!(voucher::stock_of(&pool, voucher_id).await.unwrap(), Some(2));
    }
}
