//! Shared store key layout
//!
//! All keys touched by the admission script and the workers live here so the
//! Lua scripts and the Rust side never disagree on a name.

/// 秒杀库存 (string counter)
pub fn seckill_stock(voucher_id: i64) -> String {
    format!("seckill:stock:{voucher_id}")
}

/// 已购用户集合 (set of user ids)
pub fn seckill_order(voucher_id: i64) -> String {
    format!("seckill:order:{voucher_id}")
}

/// Daily id counter: `icr:{business}:{yyyy:MM:dd}`
pub fn id_counter(business: &str, day: &str) -> String {
    format!("icr:{business}:{day}")
}

/// Distributed lock key
pub fn lock(name: &str) -> String {
    format!("lock:{name}")
}

/// Cache-aside voucher entry
pub fn voucher_cache(voucher_id: i64) -> String {
    format!("cache:voucher:{voucher_id}")
}

/// Logical-expire voucher entry (hot key, never expires in the store)
pub fn voucher_hot_cache(voucher_id: i64) -> String {
    format!("cache:voucher:hot:{voucher_id}")
}

/// Rebuild lock name for a voucher cache entry (passed to [`lock`])
pub fn voucher_rebuild_lock(voucher_id: i64) -> String {
    format!("voucher:{voucher_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(seckill_stock(7), "seckill:stock:7");
        assert_eq!(seckill_order(7), "seckill:order:7");
        assert_eq!(id_counter("order", "2024:03:01"), "icr:order:2024:03:01");
        assert_eq!(lock("order:42"), "lock:order:42");
        assert_eq!(lock(&voucher_rebuild_lock(3)), "lock:voucher:3");
        assert_eq!(voucher_hot_cache(3), "cache:voucher:hot:3");
    }
}
