//! Voucher Service - 优惠券管理
//!
//! 新建秒杀券时同步完成三件事：数据库落库（单事务）、预置准入库存、
//! 预热逻辑过期缓存。查询走缓存：先读逻辑过期热 key，未预热的再走
//! cache-aside。

use crate::cache::CacheClient;
use crate::db::repository::{voucher, voucher_order};
use crate::seckill::AdmissionGate;
use crate::store::keys;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{SeckillVoucherCreate, VoucherDetail};
use sqlx::SqlitePool;
use std::time::Duration;

/// TTL of cached voucher lookups
pub const CACHE_VOUCHER_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct VoucherService {
    pool: SqlitePool,
    cache: CacheClient,
    gate: AdmissionGate,
}

impl VoucherService {
    pub fn new(pool: SqlitePool, cache: CacheClient, gate: AdmissionGate) -> Self {
        Self { pool, cache, gate }
    }

    pub async fn add_seckill_voucher(
        &self,
        data: &SeckillVoucherCreate,
    ) -> AppResult<VoucherDetail> {
        let detail = voucher::create_seckill_voucher(&self.pool, data).await?;
        let id = detail.voucher.id;

        self.gate.preload_stock(id, data.stock).await?;
        self.cache
            .set_with_logical_expire(&keys::voucher_hot_cache(id), &detail, CACHE_VOUCHER_TTL)
            .await?;
        // drop a cached miss for this id
        self.cache.invalidate(&keys::voucher_cache(id)).await?;

        tracing::info!(voucher_id = id, stock = data.stock, "Seckill voucher created");
        Ok(detail)
    }

    pub async fn get_voucher(&self, id: i64) -> AppResult<Option<VoucherDetail>> {
        let pool = self.pool.clone();
        let hot = self
            .cache
            .get_with_logical_expire(
                &keys::voucher_hot_cache(id),
                &keys::voucher_rebuild_lock(id),
                CACHE_VOUCHER_TTL,
                move || async move { voucher::find_detail(&pool, id).await },
            )
            .await?;
        if hot.is_some() {
            return Ok(hot);
        }

        let pool = self.pool.clone();
        let detail = self
            .cache
            .get_or_load(&keys::voucher_cache(id), CACHE_VOUCHER_TTL, || async move {
                voucher::find_detail(&pool, id).await
            })
            .await?;
        Ok(detail)
    }

    /// Reject orders outside the voucher's sale window
    pub async fn ensure_on_sale(&self, id: i64, now: i64) -> AppResult<()> {
        let seckill = self
            .get_voucher(id)
            .await?
            .and_then(|detail| detail.seckill)
            .ok_or_else(|| {
                AppError::with_message(
                    ErrorCode::VoucherNotFound,
                    format!("Seckill voucher {id} not found"),
                )
            })?;

        if now < seckill.begin_time {
            return Err(AppError::new(ErrorCode::SeckillNotStarted).with_detail("voucher_id", id));
        }
        if now >= seckill.end_time {
            return Err(AppError::new(ErrorCode::SeckillEnded).with_detail("voucher_id", id));
        }
        Ok(())
    }

    /// Seed admission state from the database for every seckill voucher:
    /// the remaining stock and the users who already hold an order.
    ///
    /// Only for a fresh in-process store; a shared store already holds live counters.
    pub async fn warm_up_admission(&self) -> AppResult<usize> {
        let rows = voucher::list_seckill(&self.pool).await?;
        for row in &rows {
            self.gate.preload_stock(row.voucher_id, row.stock).await?;
            let buyers = voucher_order::user_ids_by_voucher(&self.pool, row.voucher_id).await?;
            self.gate.preload_purchasers(row.voucher_id, &buyers).await?;
        }
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::voucher::tests::sample;
    use crate::seckill::{OrderStore, SqliteOrderStore};
    use crate::store::{Admission, KvStore, MemoryStore};
    use shared::models::VoucherOrder;
    use std::sync::Arc;

    async fn service() -> (VoucherService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let db = DbService::in_memory().await.unwrap();
        let svc = VoucherService::new(
            db.pool,
            CacheClient::new(store.clone()),
            AdmissionGate::new(store.clone(), "stream.orders"),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn test_add_preloads_stock_and_preheats_cache() {
        let (svc, store) = service().await;
        let detail = svc.add_seckill_voucher(&sample(4)).await.unwrap();
        let id = detail.voucher.id;

        assert_eq!(
            store.get(&keys::seckill_stock(id)).await.unwrap().as_deref(),
            Some("4")
        );
        assert!(store.get(&keys::voucher_hot_cache(id)).await.unwrap().is_some());

        let found = svc.get_voucher(id).await.unwrap().unwrap();
        assert_eq!(found.seckill.unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_get_missing_voucher_caches_null() {
        let (svc, store) = service().await;
        assert!(svc.get_voucher(404).await.unwrap().is_none());
        assert_eq!(
            store.get(&keys::voucher_cache(404)).await.unwrap().as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_get_voucher_without_preheat_uses_cache_aside() {
        let (svc, store) = service().await;
        let detail = svc.add_seckill_voucher(&sample(1)).await.unwrap();
        let id = detail.voucher.id;
        store.delete(&keys::voucher_hot_cache(id)).await.unwrap();

        let found = svc.get_voucher(id).await.unwrap().unwrap();
        assert_eq!(found.voucher.id, id);
        assert!(store.get(&keys::voucher_cache(id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sale_window() {
        let (svc, _) = service().await;
        let mut data = sample(1);
        data.begin_time = 1_000;
        data.end_time = 2_000;
        let id = svc.add_seckill_voucher(&data).await.unwrap().voucher.id;

        let early = svc.ensure_on_sale(id, 999).await.unwrap_err();
        assert_eq!(early.code, ErrorCode::SeckillNotStarted);
        assert!(svc.ensure_on_sale(id, 1_500).await.is_ok());
        let late = svc.ensure_on_sale(id, 2_000).await.unwrap_err();
        assert_eq!(late.code, ErrorCode::SeckillEnded);

        let missing = svc.ensure_on_sale(404, 1_500).await.unwrap_err();
        assert_eq!(missing.code, ErrorCode::VoucherNotFound);
    }

    #[tokio::test]
    async fn test_warm_up_restores_admission_stock() {
        let (svc, store) = service().await;
        let id = svc.add_seckill_voucher(&sample(2)).await.unwrap().voucher.id;
        store.delete(&keys::seckill_stock(id)).await.unwrap();

        assert_eq!(svc.warm_up_admission().await.unwrap(), 1);
        let gate = AdmissionGate::new(store.clone(), "stream.orders");
        assert_eq!(gate.admit(id, 1, 1).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn test_warm_up_remembers_existing_buyers() {
        let db = DbService::in_memory().await.unwrap();
        let id = voucher::create_seckill_voucher(&db.pool, &sample(3))
            .await
            .unwrap()
            .voucher
            .id;
        // user 5 bought before the restart
        let order = VoucherOrder {
            id: 77,
            user_id: 5,
            voucher_id: id,
            created_at: 0,
        };
        SqliteOrderStore::new(db.pool.clone())
            .finalize(&order)
            .await
            .unwrap();

        // the restarted process starts with an empty store
        let store = Arc::new(MemoryStore::new());
        let gate = AdmissionGate::new(store.clone(), "stream.orders");
        let cache = CacheClient::new(store.clone());
        let svc = VoucherService::new(db.pool.clone(), cache, gate.clone());
        assert_eq!(svc.warm_up_admission().await.unwrap(), 1);

        assert_eq!(gate.admit(id, 5, 78).await.unwrap(), Admission::AlreadyPurchased);
        assert_eq!(gate.admit(id, 6, 79).await.unwrap(), Admission::Admitted);
        assert_eq!(gate.admit(id, 7, 80).await.unwrap(), Admission::Admitted);
        assert_eq!(gate.admit(id, 8, 81).await.unwrap(), Admission::OutOfStock);
        assert_eq!(store.stream_len("stream.orders"), 2);
    }
}
