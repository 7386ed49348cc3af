//! Voucher & Seckill Voucher Models

use serde::{Deserialize, Serialize};

/// Voucher kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum VoucherKind {
    /// Plain voucher, unlimited
    Normal,
    /// Flash-sale voucher with limited stock and a sale window
    Seckill,
}

/// Voucher entity (优惠券)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Voucher {
    pub id: i64,
    pub shop_id: i64,
    pub title: String,
    pub sub_title: Option<String>,
    pub rules: Option<String>,
    /// 支付金额（分）
    pub pay_value: i64,
    /// 抵扣金额（分）
    pub actual_value: i64,
    pub kind: VoucherKind,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Seckill extension row (秒杀券库存与时间窗)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub stock: i64,
    pub begin_time: i64,
    pub end_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SeckillVoucher {
    /// Whether `now` falls inside the sale window (inclusive begin, exclusive end)
    pub fn is_open_at(&self, now: i64) -> bool {
        self.begin_time <= now && now < self.end_time
    }
}

/// Voucher joined with its seckill row, as served by the lookup API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherDetail {
    #[serde(flatten)]
    pub voucher: Voucher,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seckill: Option<SeckillVoucher>,
}

/// Create seckill voucher payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeckillVoucherCreate {
    pub shop_id: i64,
    pub title: String,
    pub sub_title: Option<String>,
    pub rules: Option<String>,
    pub pay_value: i64,
    pub actual_value: i64,
    pub stock: i64,
    pub begin_time: i64,
    pub end_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(begin: i64, end: i64) -> SeckillVoucher {
        SeckillVoucher {
            voucher_id: 1,
            stock: 10,
            begin_time: begin,
            end_time: end,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_sale_window_bounds() {
        let v = window(100, 200);
        assert!(!v.is_open_at(99));
        assert!(v.is_open_at(100));
        assert!(v.is_open_at(199));
        assert!(!v.is_open_at(200));
    }

    #[test]
    fn test_detail_flattens_voucher() {
        let detail = VoucherDetail {
            voucher: Voucher {
                id: 7,
                shop_id: 1,
                title: "50 off".into(),
                sub_title: None,
                rules: None,
                pay_value: 4750,
                actual_value: 5000,
                kind: VoucherKind::Seckill,
                is_active: true,
                created_at: 0,
                updated_at: 0,
            },
            seckill: Some(window(0, 1)),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["kind"], "SECKILL");
        assert_eq!(json["seckill"]["stock"], 10);
    }
}
