use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::app::AppState;
use crate::error::ApiError;
use crate::types::Profile;

/// Session and profile resolved for the current request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub access_token: String,
    pub profile: Profile,
}

/// Bootstraps the request's bearer token and injects `CurrentUser`.
/// Any path that ends anonymous is a 401.
pub async fn require_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers).map_err(ApiError::unauthorized)?;

    let view = state.bootstrap(Some(token.clone())).await;
    let profile = view
        .profile
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(CurrentUser {
        access_token: token,
        profile,
    });
    Ok(next.run(request).await)
}

/// Admin scope; must run after `require_session`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.profile.role.is_admin() {
        warn!("User {} denied admin API {}", user.profile.id, request.uri().path());
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => Err("Empty bearer token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

/// Bearer token if one is present and well-formed
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer(headers).ok()
}
