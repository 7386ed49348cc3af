//! Voucher Order API Module
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /api/voucher-order/seckill/{voucher_id} | POST | 秒杀下单 | X-User-Id |
//! | /api/voucher-order/{order_id} | GET | 查询已落库订单 | X-User-Id |
//!
//! 下单成功返回 `202 Accepted` 与订单 id：订单已进入队列，但尚未落库。
//! 落库前查询订单返回 `404`。

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/voucher-order", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/seckill/{voucher_id}", post(handler::seckill))
        .route("/{order_id}", get(handler::get_by_id))
}
