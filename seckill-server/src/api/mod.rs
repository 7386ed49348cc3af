//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查和消费者状态
//! - [`vouchers`] - 秒杀券管理接口
//! - [`voucher_orders`] - 秒杀下单接口

pub mod health;
pub mod voucher_orders;
pub mod vouchers;

use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        // Health API - public route
        .merge(health::router())
        .merge(vouchers::router())
        .merge(voucher_orders::router())
}

/// Build a fully configured application with all middleware and state
///
/// Used by both the HTTP server and oneshot tests
pub fn build_app(state: ServerState) -> Router {
    let timeout = Duration::from_millis(state.config.request_timeout_ms);
    build_router()
        .with_state(state)
        // ========== Tower HTTP Middleware ==========
        .layer(TimeoutLayer::new(timeout))
        // CORS - Handle cross-origin requests
        .layer(CorsLayer::permissive())
        // Trace - Request tracing (logs at INFO level)
        .layer(TraceLayer::new_for_http())
}
