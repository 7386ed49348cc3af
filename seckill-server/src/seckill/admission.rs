//! Admission Gate - 准入控制
//!
//! One script round trip decides the request: stock check, one-order-per-user
//! check and enqueue happen as a single atomic unit in the shared store.
//! Admission is provisional; finalization re-checks against the database.

use super::SeckillResult;
use crate::store::{Admission, AdmissionStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AdmissionGate {
    store: Arc<dyn AdmissionStore>,
    stream: String,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn AdmissionStore>, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
        }
    }

    /// Seed the admission-side stock for a voucher
    pub async fn preload_stock(&self, voucher_id: i64, stock: i64) -> SeckillResult<()> {
        self.store.preload_stock(voucher_id, stock).await?;
        tracing::debug!(voucher_id, stock, "Admission stock preloaded");
        Ok(())
    }

    /// Record users who already hold an order so they are rejected as duplicates
    pub async fn preload_purchasers(
        &self,
        voucher_id: i64,
        user_ids: &[i64],
    ) -> SeckillResult<()> {
        self.store.mark_purchased(voucher_id, user_ids).await?;
        tracing::debug!(voucher_id, purchasers = user_ids.len(), "Purchased set preloaded");
        Ok(())
    }

    pub async fn admit(
        &self,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
    ) -> SeckillResult<Admission> {
        let admission = self
            .store
            .admit(&self.stream, voucher_id, user_id, order_id)
            .await?;
        tracing::debug!(voucher_id, user_id, order_id, ?admission, "Admission decided");
        Ok(admission)
    }
}
