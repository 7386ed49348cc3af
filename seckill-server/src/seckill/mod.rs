//! Seckill Pipeline - 秒杀下单链路
//!
//! # 数据流
//!
//! ```text
//! submit_order ──▶ IdWorker ──▶ AdmissionGate (原子脚本)
//!                                   │ 扣减缓存库存 + 记录已购 + XADD
//!                                   ▼
//!                              OrderQueue (stream + consumer group)
//!                                   │
//!                                   ▼
//!                    OrderWorker ──▶ OrderProcessor
//!                        │             加锁 → 事务落库 → 释放 → ACK
//!                        └─ RecoverySweeper (pending 回放)
//! ```
//!
//! 准入是临时结论；最终以数据库事务中的唯一性复查和 `stock > 0` 条件扣减为准。
//! 投递语义是至少一次，落库幂等。

mod admission;
mod error;
mod finalizer;
mod id_worker;
mod processor;
mod queue;
mod recovery;
mod service;
mod worker;

pub use admission::AdmissionGate;
pub use error::{SeckillError, SeckillResult};
pub use finalizer::{FinalizeOutcome, OrderStore, SqliteOrderStore};
pub use id_worker::{BEGIN_TIMESTAMP, COUNT_BITS, IdWorker, decompose};
pub use processor::{ItemOutcome, OrderProcessor, user_lock_name};
pub use queue::{OrderMessage, OrderQueue};
pub use recovery::RecoverySweeper;
pub use service::{ORDER_ID_KEY, OrderTicket, SubmitOutcome, VoucherOrderService};
pub use worker::{OrderWorker, WorkerHandle, WorkerState, WorkerStats, WorkerStatsSnapshot};
