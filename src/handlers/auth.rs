// handlers/auth.rs - POST /auth/login, /auth/register, /auth/logout

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::{ProfileCreateError, ProfileDefaults};
use crate::error::ApiError;
use crate::identity::SignUpMetadata;
use crate::middleware::{bearer_token, ApiResponse, ApiResult};
use crate::navigation::{self, MenuItem};
use crate::types::{Profile, Role};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub profile: Option<Profile>,
    pub redirect_to: String,
    pub navigation: Vec<MenuItem>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub redirect_to: String,
}

/// One `@`, non-empty local part and a dotted domain
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ApiError::field_error("email", "A valid email address is required"))
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::field_error(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/**
 * POST /auth/login - sign in and bootstrap the session
 *
 * Input: `{"email": "...", "password": "..."}`
 *
 * Output: the access token, the resolved profile (self-healed when missing),
 * the role's landing path and its navigation. A session whose profile could
 * not be resolved still signs in and lands on the customer dashboard; the
 * route guard takes it from there.
 */
pub async fn login(State(state): State<AppState>, Json(body): Json<Credentials>) -> ApiResult<LoginResponse> {
    let email = body.email.trim();
    validate_email(email)?;
    if body.password.is_empty() {
        return Err(ApiError::field_error("password", "Password is required"));
    }

    let session = state.identity.sign_in_with_password(email, &body.password).await?;
    let view = state.bootstrap(Some(session.access_token.clone())).await;

    let role = view.role().unwrap_or(Role::Customer);
    if view.profile.is_none() {
        warn!("Signed in {} without a profile", session.user_id);
    }

    let landing = navigation::landing_path(role, &state.config.routes).to_string();
    Ok(ApiResponse::success(LoginResponse {
        navigation: view
            .profile
            .as_ref()
            .map(|p| navigation::menu(p.role, &landing))
            .unwrap_or_default(),
        redirect_to: landing,
        access_token: session.access_token,
        expires_at: session.expires_at,
        user_id: session.user_id,
        profile: view.profile,
    }))
}

/// POST /auth/register - create the account and its customer profile
pub async fn register(State(state): State<AppState>, Json(body): Json<Credentials>) -> ApiResult<RegisterResponse> {
    let email = body.email.trim();
    validate_email(email)?;
    validate_password(&body.password)?;

    let defaults = ProfileDefaults::signup(&state.config.profile);
    let metadata = SignUpMetadata {
        full_name: defaults.full_name.clone(),
        role: defaults.role,
    };
    let user = state.identity.sign_up(email, &body.password, metadata).await?;

    // A registration trigger may already have written the row
    let profile = match state.profiles().create(&user.id, &defaults).await {
        Ok(profile) => Some(profile),
        Err(ProfileCreateError::DuplicateKey) => {
            info!("Profile for {} already present", user.id);
            None
        }
        Err(ProfileCreateError::Store(e)) => return Err(e.into()),
    };

    Ok(ApiResponse::created(RegisterResponse {
        user_id: user.id,
        email: user.email,
        profile,
    }))
}

/// POST /auth/logout - revoke the bearer token, if any
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<LogoutResponse> {
    if let Some(token) = bearer_token(&headers) {
        state.identity.revoke_session(&token).await?;
    }

    Ok(ApiResponse::success(LogoutResponse {
        redirect_to: state.config.routes.sign_in_path.clone(),
    }))
}
