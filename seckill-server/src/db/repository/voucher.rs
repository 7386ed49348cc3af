//! Voucher Repository

use super::{RepoError, RepoResult};
use shared::models::{SeckillVoucher, SeckillVoucherCreate, Voucher, VoucherDetail, VoucherKind};
use sqlx::{SqliteExecutor, SqlitePool};

const VOUCHER_COLUMNS: &str = "id, shop_id, title, sub_title, rules, pay_value, actual_value, kind, is_active, created_at, updated_at";
const SECKILL_COLUMNS: &str = "voucher_id, stock, begin_time, end_time, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Voucher>> {
    let row = sqlx::query_as::<_, Voucher>(&format!(
        "SELECT {VOUCHER_COLUMNS} FROM voucher WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn find_seckill(
    pool: &SqlitePool,
    voucher_id: i64,
) -> RepoResult<Option<SeckillVoucher>> {
    let row = sqlx::query_as::<_, SeckillVoucher>(&format!(
        "SELECT {SECKILL_COLUMNS} FROM seckill_voucher WHERE voucher_id = ?"
    ))
    .bind(voucher_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Voucher with its seckill row (if any)
pub async fn find_detail(pool: &SqlitePool, id: i64) -> RepoResult<Option<VoucherDetail>> {
    let Some(voucher) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let seckill = find_seckill(pool, id).await?;
    Ok(Some(VoucherDetail { voucher, seckill }))
}

/// Insert voucher + seckill row in one transaction
pub async fn create_seckill_voucher(
    pool: &SqlitePool,
    data: &SeckillVoucherCreate,
) -> RepoResult<VoucherDetail> {
    if data.stock < 0 {
        return Err(RepoError::Validation("stock must not be negative".into()));
    }
    if data.end_time <= data.begin_time {
        return Err(RepoError::Validation(
            "end_time must be after begin_time".into(),
        ));
    }

    let now = shared::util::now_millis();
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO voucher (shop_id, title, sub_title, rules, pay_value, actual_value, kind, is_active, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8) RETURNING id",
    )
    .bind(data.shop_id)
    .bind(&data.title)
    .bind(&data.sub_title)
    .bind(&data.rules)
    .bind(data.pay_value)
    .bind(data.actual_value)
    .bind(VoucherKind::Seckill)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO seckill_voucher (voucher_id, stock, begin_time, end_time, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(id)
    .bind(data.stock)
    .bind(data.begin_time)
    .bind(data.end_time)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    find_detail(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database(format!("Voucher {id} vanished after insert")))
}

/// Guarded decrement: `stock = stock - 1 WHERE stock > 0`
///
/// Returns `false` when no unit was left (or the voucher has no seckill row).
pub async fn decrement_stock_if_positive<'e, E>(executor: E, voucher_id: i64) -> RepoResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let now = shared::util::now_millis();
    let result = sqlx::query(
        "UPDATE seckill_voucher SET stock = stock - 1, updated_at = ?1 WHERE voucher_id = ?2 AND stock > 0",
    )
    .bind(now)
    .bind(voucher_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn stock_of(pool: &SqlitePool, voucher_id: i64) -> RepoResult<Option<i64>> {
    let stock: Option<i64> =
        sqlx::query_scalar("SELECT stock FROM seckill_voucher WHERE voucher_id = ?")
            .bind(voucher_id)
            .fetch_optional(pool)
            .await?;
    Ok(stock)
}

/// All seckill rows (stock warm-up)
pub async fn list_seckill(pool: &SqlitePool) -> RepoResult<Vec<SeckillVoucher>> {
    let rows = sqlx::query_as::<_, SeckillVoucher>(&format!(
        "SELECT {SECKILL_COLUMNS} FROM seckill_voucher ORDER BY voucher_id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::DbService;

    pub(crate) fn sample(stock: i64) -> SeckillVoucherCreate {
        SeckillVoucherCreate {
            shop_id: 1,
            title: "100 off 150".into(),
            sub_title: Some("weekdays".into()),
            rules: None,
            pay_value: 8000,
            actual_value: 10000,
            stock,
            begin_time: 0,
            end_time: i64::MAX,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_detail() {
        let db = DbService::in_memory().await.unwrap();
        let created = create_seckill_voucher(&db.pool, &sample(3)).await.unwrap();

        assert_eq!(created.voucher.kind, VoucherKind::Seckill);
        assert_eq!(created.seckill.as_ref().unwrap().stock, 3);

        let found = find_detail(&db.pool, created.voucher.id).await.unwrap().unwrap();
        assert_eq!(found.voucher.title, "100 off 150");
        assert!(find_detail(&db.pool, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let db = DbService::in_memory().await.unwrap();
        let err = create_seckill_voucher(&db.pool, &sample(-1)).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));

        let mut bad_window = sample(1);
        bad_window.begin_time = 10;
        bad_window.end_time = 10;
        let err = create_seckill_voucher(&db.pool, &bad_window).await.unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_decrement_stops_at_zero() {
        let db = DbService::in_memory().await.unwrap();
        let id = create_seckill_voucher(&db.pool, &sample(2)).await.unwrap().voucher.id;

        assert!(decrement_stock_if_positive(&db.pool, id).await.unwrap());
        assert!(decrement_stock_if_positive(&db.pool, id).await.unwrap());
        assert!(!decrement_stock_if_positive(&db.pool, id).await.unwrap());
        assert_eq!(stock_of(&db.pool, id).await.unwrap(), Some(0));

        assert!(!decrement_stock_if_positive(&db.pool, 404).await.unwrap());
    }
}
