//! Voucher API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/vouchers/seckill | POST | 新建秒杀券 |
//! | /api/vouchers/{id} | GET | 查询优惠券 (走缓存) |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/vouchers", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/seckill", post(handler::create_seckill))
        .route("/{id}", get(handler::get_by_id))
}
