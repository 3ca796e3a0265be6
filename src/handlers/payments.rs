// handlers/payments.rs - billing history, proof upload and admin review

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::ProofUpload;
use crate::types::{Payment, PaymentStatus};

#[derive(Debug, Deserialize)]
pub struct ProofParams {
    pub amount: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: PaymentStatus,
}

/// GET /api/payments
pub async fn list_mine(State(state): State<AppState>, Extension(user): Extension<CurrentUser>) -> ApiResult<Vec<Payment>> {
    Ok(ApiResponse::success(state.payments.list_for_user(&user.profile.id).await?))
}

/**
 * POST /api/payments?amount=150000&file_name=transfer.png
 *
 * Body: the raw proof file. Stores it under the caller's folder in the
 * proof bucket and records a pending payment.
 */
pub async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ProofParams>,
    body: Bytes,
) -> ApiResult<Payment> {
    let amount = Decimal::from_str(params.amount.trim())
        .map_err(|_| ApiError::field_error("amount", "Amount must be a number"))?;
    if params.file_name.trim().is_empty() {
        return Err(ApiError::field_error("file_name", "File name is required"));
    }

    let upload = ProofUpload {
        amount,
        file_name: params.file_name,
        bytes: body.to_vec(),
    };
    let payment = state.payments.submit_proof(&user.profile.id, upload).await?;
    Ok(ApiResponse::created(payment))
}

/// GET /api/admin/payments
pub async fn list_all(State(state): State<AppState>) -> ApiResult<Vec<Payment>> {
    Ok(ApiResponse::success(state.payments.list_all().await?))
}

/// PATCH /api/admin/payments/:id
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> ApiResult<Payment> {
    Ok(ApiResponse::success(state.payments.update_status(&id, body.status).await?))
}
