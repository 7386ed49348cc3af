//! Order Worker - 异步落库消费者
//!
//! 单个消费者顺序处理订单流：
//!
//! ```text
//! Idle → Reading ─┬─ 空 ─────────────────────────────────────────→ Idle
//!                 └─ 收到 → Locking → Locked → Finalizing → Acknowledging → Idle
//! ```
//!
//! 启动时先回放自己的 pending 列表，之后在实时读取之间定期扫描 backlog，
//! 因抢锁失败而未 ACK 的条目不会被遗忘。实时读取出错时进入
//! [`RecoverySweeper`]，处理完 backlog 再回到实时读取。

use super::processor::OrderProcessor;
use super::queue::OrderQueue;
use super::recovery::RecoverySweeper;
use super::{OrderStore, SeckillError};
use crate::core::SeckillConfig;
use crate::lock::LockFactory;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Worker 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Reading,
    Locking,
    Locked,
    Finalizing,
    Acknowledging,
    Recovering,
    Stopped,
}

/// Shared state cell; writers never need a live receiver
pub(crate) type StateCell = Arc<watch::Sender<WorkerState>>;

/// Worker 计数器
#[derive(Debug, Default)]
pub struct WorkerStats {
    finalized: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
    lock_misses: AtomicU64,
    failures: AtomicU64,
    recovered: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub finalized: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub lock_misses: u64,
    pub failures: u64,
    pub recovered: u64,
}

impl WorkerStats {
    pub(crate) fn record_finalized(&self) {
        self.finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_miss(&self) {
        self.lock_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovered(&self) {
        self.recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            finalized: self.finalized.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            lock_misses: self.lock_misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
        }
    }
}

pub struct OrderWorker {
    queue: OrderQueue,
    processor: Arc<OrderProcessor>,
    sweeper: RecoverySweeper,
    read_block: Duration,
    sweep_interval: Duration,
    recovery_backoff: Duration,
    state: StateCell,
    stats: Arc<WorkerStats>,
}

impl OrderWorker {
    pub fn new(
        queue: OrderQueue,
        locks: Arc<dyn LockFactory>,
        orders: Arc<dyn OrderStore>,
        config: &SeckillConfig,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        let state = Arc::new(state);
        let stats = Arc::new(WorkerStats::default());

        let processor = Arc::new(OrderProcessor::new(
            queue.clone(),
            locks,
            orders,
            config.lock_wait,
            config.lock_lease,
            state.clone(),
            stats.clone(),
        ));
        let sweeper = RecoverySweeper::new(
            queue.clone(),
            processor.clone(),
            config.recovery_backoff,
            state.clone(),
            stats.clone(),
        );

        Self {
            queue,
            processor,
            sweeper,
            read_block: config.read_block,
            sweep_interval: config.backlog_sweep_interval,
            recovery_backoff: config.recovery_backoff,
            state,
            stats,
        }
    }

    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Start the worker on its own task
    pub fn spawn(self, shutdown: CancellationToken) -> WorkerHandle {
        let state = self.state();
        let stats = self.stats();
        let token = shutdown.clone();
        let join = tokio::spawn(self.run(shutdown));
        WorkerHandle {
            state,
            stats,
            shutdown: token,
            join,
        }
    }

    /// Worker main loop; returns once `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(stream = %self.queue.stream(), "Order worker started");

        if self.ensure_group(&shutdown).await {
            let replayed = self.sweeper.drain(&shutdown).await;
            if replayed > 0 {
                tracing::info!(replayed, "Start-up backlog replayed");
            }
            self.live_loop(&shutdown).await;
        }

        self.set_state(WorkerState::Stopped);
        tracing::info!(stream = %self.queue.stream(), "Order worker stopped");
    }

    /// Returns `false` if shut down before the group could be created
    async fn ensure_group(&self, shutdown: &CancellationToken) -> bool {
        loop {
            match self.queue.ensure_group().await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create consumer group, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => return false,
                        _ = tokio::time::sleep(self.recovery_backoff) => {}
                    }
                }
            }
        }
    }

    async fn live_loop(&self, shutdown: &CancellationToken) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately; start-up drain already ran
        sweep.tick().await;

        loop {
            self.set_state(WorkerState::Reading);

            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sweep.tick() => {
                    self.sweeper.drain(shutdown).await;
                    continue;
                }
                read = self.queue.read_live(self.read_block) => read,
            };

            match read {
                Ok(entries) => {
                    for entry in &entries {
                        match self.processor.process(entry).await {
                            Ok(_) | Err(SeckillError::LockUnavailable(_)) => {}
                            Err(e) => {
                                tracing::error!(
                                    entry_id = %entry.id,
                                    error = %e,
                                    "Order processing failed, entering recovery"
                                );
                                self.sweeper.drain(shutdown).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Live read failed, entering recovery");
                    self.sweeper.drain(shutdown).await;
                }
            }

            self.set_state(WorkerState::Idle);
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}

/// Handle to a spawned [`OrderWorker`]
pub struct WorkerHandle {
    state: watch::Receiver<WorkerState>,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Order worker task failed");
        }
    }
}
