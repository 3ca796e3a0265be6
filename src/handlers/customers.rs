// handlers/customers.rs - GET /api/admin/customers

use axum::extract::State;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::Profile;

pub async fn list(State(state): State<AppState>) -> ApiResult<Vec<Profile>> {
    Ok(ApiResponse::success(state.customers.list().await?))
}
