//! 健康检查路由
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /health | GET | 简单健康检查 | 无 |
//! | /health/detailed | GET | 组件检查 + 订单消费者状态 | 无 |
//!
//! # 响应示例
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "store": "redis",
//!   "worker": "reading"
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::Instant;

use crate::core::{ServerState, StoreBackend};
use crate::seckill::{WorkerState, WorkerStatsSnapshot};

/// 健康检查路由 - 公共路由 (无需认证)
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

/// 简单健康检查响应
#[derive(Serialize)]
pub struct HealthResponse {
    /// 状态 (ok | degraded)
    status: &'static str,
    version: &'static str,
    store: StoreBackend,
    worker: WorkerState,
}

/// 详细健康检查响应
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    /// 运行时间 (秒)
    uptime_seconds: u64,
    checks: HealthChecks,
    worker: WorkerReport,
}

/// 健康检查详情
#[derive(Serialize)]
pub struct HealthChecks {
    database: CheckResult,
    /// 共享存储 (读取订单流 pending 数)
    store: CheckResult,
}

#[derive(Serialize)]
pub struct WorkerReport {
    state: WorkerState,
    /// 已投递未 ACK 的订单数
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<u64>,
    stats: WorkerStatsSnapshot,
}

/// 单项检查结果
#[derive(Serialize)]
pub struct CheckResult {
    /// 状态 (ok | error)
    status: &'static str,
    /// 延迟 (毫秒)
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl CheckResult {
    fn ok_with_latency(latency_ms: u64) -> Self {
        Self {
            status: "ok",
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// The worker only stops on shutdown
fn worker_alive(state: WorkerState) -> bool {
    state != WorkerState::Stopped
}

/// 基础健康检查
pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let worker = state.current_worker_state();
    Json(HealthResponse {
        status: if worker_alive(worker) { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_backend,
        worker,
    })
}

/// 包含组件状态的详细健康检查
pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let db_start = Instant::now();
    let db_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db.pool)
        .await
    {
        Ok(_) => CheckResult::ok_with_latency(db_start.elapsed().as_millis() as u64),
        Err(e) => CheckResult::error(format!("Database error: {e}")),
    };

    let store_start = Instant::now();
    let (store_check, pending) = match state.order_queue.pending_count().await {
        Ok(pending) => (
            CheckResult::ok_with_latency(store_start.elapsed().as_millis() as u64),
            Some(pending),
        ),
        Err(e) => (CheckResult::error(e.to_string()), None),
    };

    let worker_state = state.current_worker_state();
    let all_ok = db_check.is_ok() && store_check.is_ok() && worker_alive(worker_state);

    Json(DetailedHealthResponse {
        status: if all_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime().as_secs(),
        checks: HealthChecks {
            database: db_check,
            store: store_check,
        },
        worker: WorkerReport {
            state: worker_state,
            pending,
            stats: state.worker_stats.snapshot(),
        },
    })
}
