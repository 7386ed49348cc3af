//! Voucher Order Repository

use super::RepoResult;
use shared::models::VoucherOrder;
use sqlx::{SqliteExecutor, SqlitePool};

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<VoucherOrder>> {
    let row = sqlx::query_as::<_, VoucherOrder>(
        "SELECT id, user_id, voucher_id, created_at FROM voucher_order WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Uniqueness re-check for (user, voucher)
pub async fn find_by_user_voucher<'e, E>(
    executor: E,
    user_id: i64,
    voucher_id: i64,
) -> RepoResult<Option<VoucherOrder>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, VoucherOrder>(
        "SELECT id, user_id, voucher_id, created_at FROM voucher_order WHERE user_id = ? AND voucher_id = ?",
    )
    .bind(user_id)
    .bind(voucher_id)
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// Insert the order row; `false` if the id or (user, voucher) already exists
pub async fn insert<'e, E>(executor: E, order: &VoucherOrder) -> RepoResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO voucher_order (id, user_id, voucher_id, created_at) VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.voucher_id)
    .bind(order.created_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_by_voucher(pool: &SqlitePool, voucher_id: i64) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voucher_order WHERE voucher_id = ?")
        .bind(voucher_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Users holding an order for the voucher
pub async fn user_ids_by_voucher(pool: &SqlitePool, voucher_id: i64) -> RepoResult<Vec<i64>> {
    let rows: Vec<i64> =
        sqlx::query_scalar("SELECT user_id FROM voucher_order WHERE voucher_id = ?")
            .bind(voucher_id)
            .fetch_all(pool)
            .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use crate::db::repository::voucher;

    #[tokio::test]
    async fn test_insert_is_unique_per_user_and_voucher() {
        let db = DbService::in_memory().await.unwrap();
        let voucher_id = voucher::create_seckill_voucher(&db.pool, &voucher::tests::sample(5))
            .await
            .unwrap()
            .voucher
            .id;

        let order = VoucherOrder {
            id: 1001,
            user_id: 7,
            voucher_id,
            created_at: 1,
        };
        assert!(insert(&db.pool, &order).await.unwrap());

        let again = VoucherOrder { id: 1002, ..order.clone() };
        assert!(!insert(&db.pool, &again).await.unwrap());

        assert_eq!(find_by_id(&db.pool, 1001).await.unwrap(), Some(order.clone()));
        assert_eq!(
            find_by_user_voucher(&db.pool, 7, voucher_id).await.unwrap(),
            Some(order)
        );
        assert!(find_by_id(&db.pool, 1002).await.unwrap().is_none());
        assert_eq!(count_by_voucher(&db.pool, voucher_id).await.unwrap(), 1);
    }
}
