//! Voucher Order Model

use serde::{Deserialize, Serialize};

/// Finalized seckill order (秒杀订单)
///
/// Existence of the row means the order is finalized; rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub created_at: i64,
}
