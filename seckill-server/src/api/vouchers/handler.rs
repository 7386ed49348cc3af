//! Voucher API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use shared::models::{SeckillVoucherCreate, VoucherDetail};

use crate::core::ServerState;
use crate::utils::{ApiResponse, AppError, AppResult, ErrorCode};

/// Create a seckill voucher
pub async fn create_seckill(
    State(state): State<ServerState>,
    Json(payload): Json<SeckillVoucherCreate>,
) -> AppResult<(StatusCode, Json<ApiResponse<VoucherDetail>>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    let detail = state.vouchers.add_seckill_voucher(&payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

/// Get voucher by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<VoucherDetail>>> {
    let detail = state.vouchers.get_voucher(id).await?.ok_or_else(|| {
        AppError::with_message(ErrorCode::VoucherNotFound, format!("Voucher {id} not found"))
    })?;
    Ok(crate::utils::ok(detail))
}
