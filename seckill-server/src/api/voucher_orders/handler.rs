//! Voucher Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use shared::models::VoucherOrder;

use crate::auth::CurrentUser;
use crate::core::ServerState;
use crate::seckill::{OrderTicket, SubmitOutcome};
use crate::utils::{ApiResponse, AppError, AppResult, ErrorCode};

/// Submit a seckill order
///
/// `202` carries the order id; persistence happens asynchronously.
pub async fn seckill(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(voucher_id): Path<i64>,
) -> AppResult<(StatusCode, Json<ApiResponse<OrderTicket>>)> {
    state
        .vouchers
        .ensure_on_sale(voucher_id, shared::util::now_millis())
        .await?;

    match state.voucher_orders.submit_order(voucher_id, user.id).await? {
        SubmitOutcome::Accepted(ticket) => Ok((
            StatusCode::ACCEPTED,
            Json(ApiResponse::success_with_message("Order accepted", ticket)),
        )),
        SubmitOutcome::OutOfStock => Err(AppError::out_of_stock(voucher_id)),
        SubmitOutcome::AlreadyPurchased => Err(AppError::already_purchased(voucher_id)),
    }
}

/// Get a persisted order; callers only see their own orders
pub async fn get_by_id(
    State(state): State<ServerState>,
    user: CurrentUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<ApiResponse<VoucherOrder>>> {
    let order = state
        .voucher_orders
        .find_order(order_id)
        .await?
        .filter(|order| order.user_id == user.id)
        .ok_or_else(|| {
            AppError::with_message(
                ErrorCode::OrderNotFound,
                format!("Order {order_id} not found"),
            )
        })?;
    Ok(crate::utils::ok(order))
}
