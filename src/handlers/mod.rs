// handlers/mod.rs - portal gateway handlers
//
// Public:    /, /health, /auth/*, /portal/*
// Customer:  /api/me, /api/tickets, /api/payments          (require_session)
// Admin:     /api/admin/*                                 (require_session + require_admin)

pub mod auth;
pub mod customers;
pub mod payments;
pub mod portal;
pub mod tickets;

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let routes = &state.config.routes;

    Json(json!({
        "success": true,
        "data": {
            "name": "ISP Nexus portal",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Customer support and billing portal gateway",
            "sign_in": routes.sign_in_path,
            "endpoints": {
                "auth": "/auth/login, /auth/register, /auth/logout (public)",
                "portal": "/portal/*path (route guard, redirects)",
                "me": "/api/me (session)",
                "tickets": "/api/tickets[/events] (session)",
                "payments": "/api/payments (session)",
                "admin": "/api/admin/{tickets,payments,customers} (admin)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
