//! Voucher Order Service - 下单入口
//!
//! 同步路径只做两件事：生成订单 id、调用准入脚本。
//! 返回 `Accepted` 时订单只是进入了队列，尚未落库；
//! 调用方可通过 [`VoucherOrderService::find_order`] 轮询落库结果。

use super::admission::AdmissionGate;
use super::finalizer::OrderStore;
use super::id_worker::IdWorker;
use super::SeckillResult;
use crate::store::Admission;
use serde::Serialize;
use shared::models::VoucherOrder;
use std::sync::Arc;

/// Business key of the order id counter
pub const ORDER_ID_KEY: &str = "order";

/// Receipt for an admitted order. Accepted is not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTicket {
    pub order_id: i64,
    pub voucher_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(OrderTicket),
    OutOfStock,
    AlreadyPurchased,
}

#[derive(Clone)]
pub struct VoucherOrderService {
    ids: IdWorker,
    gate: AdmissionGate,
    orders: Arc<dyn OrderStore>,
}

impl VoucherOrderService {
    pub fn new(ids: IdWorker, gate: AdmissionGate, orders: Arc<dyn OrderStore>) -> Self {
        Self { ids, gate, orders }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub async fn submit_order(
        &self,
        voucher_id: i64,
        user_id: i64,
    ) -> SeckillResult<SubmitOutcome> {
        let order_id = self.ids.next_id(ORDER_ID_KEY).await?;

        let outcome = match self.gate.admit(voucher_id, user_id, order_id).await? {
            Admission::Admitted => {
                tracing::info!(order_id = %order_id, user_id, voucher_id, "Order accepted");
                SubmitOutcome::Accepted(OrderTicket {
                    order_id,
                    voucher_id,
                    user_id,
                })
            }
            Admission::OutOfStock => SubmitOutcome::OutOfStock,
            Admission::AlreadyPurchased => SubmitOutcome::AlreadyPurchased,
        };
        Ok(outcome)
    }

    /// Persisted order, `None` until the worker has finalized it
    pub async fn find_order(&self, order_id: i64) -> SeckillResult<Option<VoucherOrder>> {
        Ok(self.orders.find_by_id(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::seckill::SqliteOrderStore;
    use crate::store::MemoryStore;

    async fn service() -> VoucherOrderService {
        let store = Arc::new(MemoryStore::new());
        let db = DbService::in_memory().await.unwrap();
        VoucherOrderService::new(
            IdWorker::new(store.clone()),
            AdmissionGate::new(store, "stream.orders"),
            Arc::new(SqliteOrderStore::new(db.pool)),
        )
    }

    #[tokio::test]
    async fn test_submit_outcomes() {
        let svc = service().await;
        svc.gate().preload_stock(1, 1).await.unwrap();

        let SubmitOutcome::Accepted(ticket) = svc.submit_order(1, 10).await.unwrap() else {
            panic!("first order must be accepted");
        };
        assert_eq!((ticket.voucher_id, ticket.user_id), (1, 10));
        assert!(ticket.order_id > 0);

        assert_eq!(
            svc.submit_order(1, 10).await.unwrap(),
            SubmitOutcome::AlreadyPurchased
        );
        assert_eq!(svc.submit_order(1, 11).await.unwrap(), SubmitOutcome::OutOfStock);
    }

    #[tokio::test]
    async fn test_unknown_voucher_is_out_of_stock() {
        let svc = service().await;
        assert_eq!(svc.submit_order(404, 1).await.unwrap(), SubmitOutcome::OutOfStock);
    }

    #[tokio::test]
    async fn test_accepted_order_not_yet_persisted() {
        let svc = service().await;
        svc.gate().preload_stock(2, 5).await.unwrap();

        let SubmitOutcome::Accepted(ticket) = svc.submit_order(2, 1).await.unwrap() else {
            panic!("expected acceptance");
        };
        assert!(svc.find_order(ticket.order_id).await.unwrap().is_none());
    }
}
