//! Seckill pipeline errors

use crate::db::repository::RepoError;
use crate::lock::LockError;
use crate::store::StoreError;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

/// 秒杀链路错误
///
/// | 变体 | 性质 | 处理 |
/// |------|------|------|
/// | StoreUnavailable | 瞬时 | 准入路径直接返回调用方；消费路径由恢复循环重试 |
/// | LockUnavailable | 瞬时 | 不 ACK，留在 pending 等待回放 |
/// | Database | 瞬时 | 同上 |
/// | ConsistencyViolation | 终态 | 记录错误日志，ACK 丢弃 |
/// | MalformedEntry | 终态 | 记录错误日志，ACK 丢弃 |
#[derive(Debug, Error)]
pub enum SeckillError {
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Lock {0} is held elsewhere")]
    LockUnavailable(String),

    #[error(
        "Order {order_id} was admitted but voucher {voucher_id} has no persisted stock left (user {user_id})"
    )]
    ConsistencyViolation {
        order_id: i64,
        user_id: i64,
        voucher_id: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] RepoError),

    #[error("Malformed queue entry {id}: {reason}")]
    MalformedEntry { id: String, reason: String },
}

impl SeckillError {
    /// Terminal errors are acknowledged and dropped; retrying cannot fix them
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConsistencyViolation { .. } | Self::MalformedEntry { .. }
        )
    }
}

impl From<LockError> for SeckillError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Store(e) => Self::StoreUnavailable(e),
        }
    }
}

impl From<SeckillError> for AppError {
    fn from(err: SeckillError) -> Self {
        match err {
            SeckillError::StoreUnavailable(e) => AppError::store_unavailable(e.to_string()),
            SeckillError::Database(e) => e.into(),
            other => AppError::internal(other.to_string()),
        }
    }
}

pub type SeckillResult<T> = Result<T, SeckillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(
            SeckillError::ConsistencyViolation {
                order_id: 1,
                user_id: 2,
                voucher_id: 3
            }
            .is_terminal()
        );
        assert!(
            SeckillError::MalformedEntry {
                id: "1-0".into(),
                reason: "missing userId".into()
            }
            .is_terminal()
        );
        assert!(!SeckillError::LockUnavailable("order:1".into()).is_terminal());
        assert!(!SeckillError::StoreUnavailable(StoreError::Protocol("x".into())).is_terminal());
    }

    #[test]
    fn test_store_error_maps_to_503_code() {
        let app: AppError =
            SeckillError::StoreUnavailable(StoreError::Protocol("down".into())).into();
        assert_eq!(app.code, ErrorCode::StoreUnavailable);
    }
}
