// handlers/tickets.rs - customer tickets and the admin ticket CRM

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::str::FromStr;

use crate::app::AppState;
use crate::database::Subscription;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::NewTicket;
use crate::types::{Ticket, TicketStatus};

#[derive(Debug, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: TicketStatus,
}

/// GET /api/tickets - the caller's tickets, newest first
pub async fn list_mine(State(state): State<AppState>, Extension(user): Extension<CurrentUser>) -> ApiResult<Vec<Ticket>> {
    Ok(ApiResponse::success(state.tickets.list_for_user(&user.profile.id).await?))
}

/**
 * POST /api/tickets - open a ticket
 *
 * Input: `{"title": "...", "description": "...", "priority": "low|medium|high"}`
 */
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<NewTicket>,
) -> ApiResult<Ticket> {
    let ticket = state.tickets.create(&user.profile.id, body).await?;
    Ok(ApiResponse::created(ticket))
}

/// GET /api/admin/tickets?status=open|in_progress|resolved|all
pub async fn list_all(State(state): State<AppState>, Query(filter): Query<TicketFilter>) -> ApiResult<Vec<Ticket>> {
    let status = match filter.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(s) => Some(TicketStatus::from_str(s).map_err(ApiError::bad_request)?),
    };
    Ok(ApiResponse::success(state.tickets.list_all(status).await?))
}

/// PATCH /api/admin/tickets/:id
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> ApiResult<Ticket> {
    Ok(ApiResponse::success(state.tickets.update_status(&id, body.status).await?))
}

/// GET /api/tickets/events - live changes to the caller's tickets
pub async fn events_mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let subscription = state.tickets.watch_for_user(&user.profile.id).await?;
    Ok(change_stream(subscription))
}

/// GET /api/admin/tickets/events - live changes to every ticket
pub async fn events_all(State(state): State<AppState>) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let subscription = state.tickets.watch_all().await?;
    Ok(change_stream(subscription))
}

fn change_stream(subscription: Subscription) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = subscription.map(|change| {
        Event::default()
            .event(format!("{:?}", change.kind).to_lowercase())
            .json_data(&change)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
