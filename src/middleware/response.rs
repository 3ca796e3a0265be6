use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Success envelope: `{"success": true, "data": ...}`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::with_status(data, StatusCode::OK)
    }

    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self { data, status_code }
    }

    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.data) {
            Ok(data) => (self.status_code, Json(json!({ "success": true, "data": data }))).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": true,
                        "message": "Failed to serialize response data",
                        "code": "INTERNAL_SERVER_ERROR"
                    })),
                )
                    .into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
