//! 服务层
//!
//! - [`VoucherService`] - 秒杀券创建、缓存查询、库存预热
//!
//! 下单链路的服务在 [`crate::seckill`]。

pub mod voucher_service;

pub use voucher_service::{CACHE_VOUCHER_TTL, VoucherService};
