// handlers/portal.rs - GET /portal/*path (route guard) and GET /api/me

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use serde::Serialize;
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;
use crate::guard::{GuardDecision, RoleScope};
use crate::middleware::{bearer_token, ApiResponse, ApiResult, CurrentUser};
use crate::navigation::{self, MenuItem};
use crate::types::Profile;

#[derive(Debug, Serialize)]
pub struct PortalPage {
    pub path: String,
    pub scope: RoleScope,
    pub profile: Option<Profile>,
    pub navigation: Vec<MenuItem>,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub profile: Profile,
    pub display_name: String,
    pub landing_path: String,
    pub navigation: Vec<MenuItem>,
}

/// Page path below the `/portal` mount, always starting with `/`
fn page_path(uri_path: &str) -> String {
    match uri_path.strip_prefix("/portal") {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => "/".to_string(),
    }
}

/**
 * GET /portal/{path} - bootstrap the caller's session and run the route guard
 *
 * Render: 200 with the page path, profile and menu.
 * Redirect: 307 to the sign-in page or the customer landing page.
 */
pub async fn portal_page(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    let path = page_path(uri.path());
    let view = state.bootstrap(bearer_token(&headers)).await;

    match state.guard.decide(&view, &path) {
        GuardDecision::Render => {
            let navigation = view
                .profile
                .as_ref()
                .map(|p| navigation::menu(p.role, &path))
                .unwrap_or_default();

            ApiResponse::success(PortalPage {
                scope: state.guard.scope_for(&path),
                path,
                profile: view.profile,
                navigation,
            })
            .into_response()
        }
        GuardDecision::Redirect(target) => {
            debug!("Guard redirected {} to {}", path, target);
            Redirect::temporary(&target).into_response()
        }
        // Bootstrap always commits before returning
        GuardDecision::Loading => ApiError::service_unavailable("Session is still loading").into_response(),
    }
}

/// GET /api/me
pub async fn me(State(state): State<AppState>, Extension(user): Extension<CurrentUser>) -> ApiResult<Me> {
    let role = user.profile.role;
    let landing_path = navigation::landing_path(role, &state.config.routes).to_string();

    Ok(ApiResponse::success(Me {
        display_name: user.profile.display_name().to_string(),
        navigation: navigation::menu(role, &landing_path),
        landing_path,
        profile: user.profile,
    }))
}
