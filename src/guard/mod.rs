//! Route guard: decides whether a path may render for the current view state.

use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

use crate::auth::{AuthHandle, AuthViewState};
use crate::config::RouteConfig;
use crate::types::Role;

/// Authorization tier a route requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    Public,
    Authenticated,
    Admin,
}

impl RoleScope {
    /// `/admin/**` is admin-only, `/dashboard/**` needs a session, the rest is public
    pub fn for_path(path: &str) -> Self {
        if under(path, "/admin") {
            RoleScope::Admin
        } else if under(path, "/dashboard") {
            RoleScope::Authenticated
        } else {
            RoleScope::Public
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, RoleScope::Public)
    }
}

fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum GuardDecision {
    Loading,
    Render,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    sign_in_path: String,
    landing_path: String,
}

impl RouteGuard {
    pub fn new(routes: &RouteConfig) -> Self {
        Self {
            sign_in_path: routes.sign_in_path.clone(),
            landing_path: routes.customer_landing.clone(),
        }
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    pub fn scope_for(&self, path: &str) -> RoleScope {
        RoleScope::for_path(path)
    }

    pub fn decide(&self, state: &AuthViewState, path: &str) -> GuardDecision {
        self.decide_scope(state, self.scope_for(path))
    }

    pub fn decide_scope(&self, state: &AuthViewState, scope: RoleScope) -> GuardDecision {
        // Public pages never wait on the session
        if scope == RoleScope::Public {
            return GuardDecision::Render;
        }
        if state.is_loading {
            return GuardDecision::Loading;
        }

        match (&state.profile, scope) {
            (None, _) => GuardDecision::Redirect(self.sign_in_path.clone()),
            (Some(profile), RoleScope::Admin) if profile.role != Role::Admin => {
                warn!("User {} denied admin route", profile.id);
                GuardDecision::Redirect(self.landing_path.clone())
            }
            _ => GuardDecision::Render,
        }
    }

    /// Re-evaluate whenever the view state or the location changes
    pub fn watch(&self, auth: AuthHandle, location: watch::Receiver<String>) -> GuardWatch {
        GuardWatch {
            guard: self.clone(),
            auth,
            location,
            auth_closed: false,
            location_closed: false,
        }
    }
}

/// Live guard decision over a view state and a location
pub struct GuardWatch {
    guard: RouteGuard,
    auth: AuthHandle,
    location: watch::Receiver<String>,
    auth_closed: bool,
    location_closed: bool,
}

impl GuardWatch {
    pub fn current(&self) -> GuardDecision {
        let path = self.location.borrow().clone();
        self.guard.decide(&self.auth.snapshot(), &path)
    }

    /// Wait for either input to change and return the new decision. `None`
    /// once both inputs are closed.
    pub async fn changed(&mut self) -> Option<GuardDecision> {
        loop {
            if self.auth_closed && self.location_closed {
                return None;
            }

            tokio::select! {
                auth = self.auth.changed(), if !self.auth_closed => match auth {
                    Ok(()) => return Some(self.current()),
                    Err(_) => self.auth_closed = true,
                },
                location = self.location.changed(), if !self.location_closed => match location {
                    Ok(()) => return Some(self.current()),
                    Err(_) => self.location_closed = true,
                },
            }
        }
    }
}
