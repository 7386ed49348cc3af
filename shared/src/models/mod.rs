//! Data models
//!
//! Shared between seckill-server and its HTTP clients.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY), timestamps are Unix millis.

pub mod voucher;
pub mod voucher_order;

// Re-exports
pub use voucher::*;
pub use voucher_order::*;
