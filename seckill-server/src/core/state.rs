use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::cache::CacheClient;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result, ServerError};
use crate::db::DbService;
use crate::lock;
use crate::seckill::{
    AdmissionGate, IdWorker, OrderQueue, OrderStore, OrderWorker, SqliteOrderStore,
    VoucherOrderService, WorkerState, WorkerStats,
};
use crate::services::VoucherService;
use crate::store::{MemoryStore, RedisStore, SharedStore};

/// Interval of the backlog monitor
const BACKLOG_REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// 共享存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    /// 进程内存储，仅适用于单进程部署
    Memory,
}

/// 服务器状态 - 持有所有服务的共享引用
///
/// 使用 Arc 实现浅拷贝，clone 成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | db | SQLite 连接池 |
/// | store_backend | 共享存储后端 |
/// | vouchers | 秒杀券管理与缓存查询 |
/// | voucher_orders | 下单入口 (准入) |
/// | order_queue | 订单流句柄 (监控 pending) |
/// | worker_state / worker_stats | 订单消费者状态与计数 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub db: DbService,
    pub store_backend: StoreBackend,
    pub vouchers: VoucherService,
    pub voucher_orders: VoucherOrderService,
    pub order_queue: OrderQueue,
    pub worker_state: watch::Receiver<WorkerState>,
    pub worker_stats: Arc<WorkerStats>,
    /// Taken once by `start_background_tasks`
    worker: Arc<Mutex<Option<OrderWorker>>>,
    started_at: Instant,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录
    /// 2. 数据库 (迁移)
    /// 3. 共享存储 (设置了 REDIS_URL 时连接 Redis，否则使用进程内存储)
    /// 4. 各服务与订单消费者
    pub async fn initialize(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.work_dir)?;

        let db = if config.uses_in_memory_database() {
            DbService::in_memory().await
        } else {
            DbService::new(&config.database_path).await
        }
        .map_err(ServerError::Database)?;

        match &config.redis_url {
            Some(url) => {
                let store = RedisStore::connect(url).await?;
                Ok(Self::from_parts(config, db, Arc::new(store), StoreBackend::Redis))
            }
            None if config.is_production() => Err(ServerError::Config(
                "REDIS_URL is required in production".into(),
            )),
            None => {
                tracing::warn!("REDIS_URL not set, using in-process store (single instance only)");
                let state = Self::from_parts(
                    config,
                    db,
                    Arc::new(MemoryStore::new()),
                    StoreBackend::Memory,
                );
                // a fresh in-process store has no admission state yet
                let seeded = state
                    .vouchers
                    .warm_up_admission()
                    .await
                    .map_err(ServerError::Database)?;
                tracing::info!(vouchers = seeded, "Admission state seeded from database");
                Ok(state)
            }
        }
    }

    /// Wire every service onto one store
    pub fn from_parts<S: SharedStore + 'static>(
        config: &Config,
        db: DbService,
        store: Arc<S>,
        store_backend: StoreBackend,
    ) -> Self {
        let seckill = &config.seckill;

        let gate = AdmissionGate::new(store.clone(), &seckill.stream);
        let order_queue = OrderQueue::new(
            store.clone(),
            &seckill.stream,
            &seckill.group,
            &seckill.consumer,
        );
        let locks = lock::factory(seckill.lock_kind, store.clone());
        let orders: Arc<dyn OrderStore> = Arc::new(SqliteOrderStore::new(db.pool.clone()));

        let vouchers = VoucherService::new(
            db.pool.clone(),
            CacheClient::new(store.clone()),
            gate.clone(),
        );
        let voucher_orders = VoucherOrderService::new(IdWorker::new(store), gate, orders.clone());

        let worker = OrderWorker::new(order_queue.clone(), locks, orders, seckill);

        Self {
            config: config.clone(),
            db,
            store_backend,
            vouchers,
            voucher_orders,
            order_queue,
            worker_state: worker.state(),
            worker_stats: worker.stats(),
            worker: Arc::new(Mutex::new(Some(worker))),
            started_at: Instant::now(),
        }
    }

    /// 启动后台任务
    ///
    /// - 订单消费者 (Worker)
    /// - backlog 监控 (Periodic)
    ///
    /// 订单消费者只能启动一次；重复调用不会再次启动。
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        match self.worker.lock().take() {
            Some(worker) => {
                let token = tasks.shutdown_token();
                tasks.spawn("order_worker", TaskKind::Worker, worker.run(token));
            }
            None => tracing::warn!("Order worker already started"),
        }

        let token = tasks.shutdown_token();
        let queue = self.order_queue.clone();
        let stats = self.worker_stats.clone();
        tasks.spawn("backlog_monitor", TaskKind::Periodic, async move {
            let mut interval = tokio::time::interval(BACKLOG_REPORT_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match queue.pending_count().await {
                    Ok(pending) => {
                        let stats = stats.snapshot();
                        tracing::info!(
                            pending,
                            finalized = stats.finalized,
                            duplicates = stats.duplicates,
                            dropped = stats.dropped,
                            lock_misses = stats.lock_misses,
                            "Order queue status"
                        );
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to read order backlog"),
                }
            }
        });

        tasks
    }

    pub fn current_worker_state(&self) -> WorkerState {
        *self.worker_state.borrow()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 打印启动横幅
    pub fn print_banner(&self, addr: std::net::SocketAddr) {
        tracing::info!("========================================");
        tracing::info!("  Seckill Server v{}", env!("CARGO_PKG_VERSION"));
        tracing::info!("  Listening:   http://{}", addr);
        tracing::info!("  Environment: {}", self.config.environment);
        tracing::info!("  Store:       {:?}", self.store_backend);
        tracing::info!(
            "  Stream:      {} (group {}, consumer {})",
            self.config.seckill.stream,
            self.config.seckill.group,
            self.config.seckill.consumer
        );
        tracing::info!("  Lock:        {:?}", self.config.seckill.lock_kind);
        tracing::info!("========================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: &str, work_dir: &str) -> Config {
        let work_dir = work_dir.to_string();
        let environment = environment.to_string();
        Config::from_lookup(move |key| match key {
            "ENVIRONMENT" => Some(environment.clone()),
            "WORK_DIR" => Some(work_dir.clone()),
            "DATABASE_PATH" => Some(":memory:".into()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_production_requires_redis() {
        let dir = tempfile::tempdir().unwrap();
        let config = config("production", dir.path().to_str().unwrap());
        let result = ServerState::initialize(&config).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_development_falls_back_to_memory_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config("development", dir.path().to_str().unwrap());
        let state = ServerState::initialize(&config).await.unwrap();
        assert_eq!(state.store_backend, StoreBackend::Memory);
    }
}
