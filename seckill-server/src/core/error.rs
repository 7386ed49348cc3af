use crate::store::StoreError;
use shared::error::AppError;
use thiserror::Error;

/// 服务器启动与运行错误
///
/// 请求级错误走 [`AppError`]；这里只覆盖初始化和监听阶段。
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库初始化失败: {0}")]
    Database(AppError),

    #[error("共享存储不可用: {0}")]
    Store(#[from] StoreError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 服务器 Result 类型别名
pub type Result<T> = std::result::Result<T, ServerError>;
