//! Seckill Server - 秒杀下单服务
//!
//! # 架构概述
//!
//! 下单请求在共享存储中完成准入（库存 + 一人一单，原子脚本），
//! 通过后写入订单流并立即返回订单号；后台订单消费者从流中读取订单，
//! 在用户级分布式锁下落库并 ACK。崩溃后未 ACK 的订单由 backlog 恢复。
//!
//! - **共享存储** (`store`): Redis 或进程内存储 (KV、原子脚本、Stream)
//! - **分布式锁** (`lock`): 租约锁 / 看门狗续期锁
//! - **下单链路** (`seckill`): 准入、ID 生成、订单流、消费者、恢复
//! - **数据库** (`db`): SQLite (sqlx)
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! seckill-server/src/
//! ├── core/          # 配置、状态、错误、后台任务、HTTP 服务器
//! ├── api/           # HTTP 路由和处理器
//! ├── auth/          # 用户身份提取
//! ├── cache/         # cache-aside / 逻辑过期缓存
//! ├── db/            # 数据库层
//! ├── lock/          # 分布式锁
//! ├── seckill/       # 下单链路
//! ├── services/      # 优惠券服务
//! ├── store/         # 共享存储
//! └── utils/         # 日志等工具
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod core;
pub mod db;
pub mod lock;
pub mod seckill;
pub mod services;
pub mod store;
pub mod utils;

// Re-export 公共类型
pub use auth::CurrentUser;
pub use core::{Config, SeckillConfig, Server, ServerState, StoreBackend};
pub use seckill::{OrderWorker, VoucherOrderService, WorkerState};
pub use store::{MemoryStore, RedisStore, SharedStore};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 加载 `.env` 并初始化日志
///
/// 读取 `LOG_LEVEL` / `LOG_DIR` / `LOG_JSON`；`RUST_LOG` 优先。
pub fn setup_environment() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    let json = std::env::var("LOG_JSON")
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1");

    if let Some(dir) = &log_dir {
        std::fs::create_dir_all(dir)?;
    }

    init_logger_with_file(log_level.as_deref(), json, log_dir.as_deref());
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
   _____           __   _ ____
  / ___/___  _____/ /__(_) / /
  \__ \/ _ \/ ___/ //_/ / / /
 ___/ /  __/ /__/ ,< / / / /
/____/\___/\___/_/|_/_/_/_/
    "#
    );
}
