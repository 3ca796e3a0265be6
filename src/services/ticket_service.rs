use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::ServiceError;
use crate::database::{decode_row, decode_rows, tables, Filter, Order, RecordStore, StoreError, Subscription};
use crate::types::{Ticket, TicketPriority, TicketStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
}

/// Support tickets: customers file them, staff triage them
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn RecordStore>,
}

impl TicketService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Ticket>, ServiceError> {
        let filter = Filter::new().eq("user_id", user_id);
        let rows = self
            .store
            .select(tables::TICKETS, &filter, Some(&Order::desc("created_at")))
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// All tickets, optionally narrowed to one status
    pub async fn list_all(&self, status: Option<TicketStatus>) -> Result<Vec<Ticket>, ServiceError> {
        let filter = match status {
            Some(status) => Filter::new().eq("status", status.as_str()),
            None => Filter::new(),
        };
        let rows = self
            .store
            .select(tables::TICKETS, &filter, Some(&Order::desc("created_at")))
            .await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn create(&self, user_id: &str, ticket: NewTicket) -> Result<Ticket, ServiceError> {
        let title = ticket.title.trim();
        if title.is_empty() {
            return Err(ServiceError::Validation("Ticket title is required".to_string()));
        }
        let description = ticket
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let row = self
            .store
            .insert(
                tables::TICKETS,
                json!({
                    "user_id": user_id,
                    "title": title,
                    "description": description,
                    "status": TicketStatus::Open,
                    "priority": ticket.priority,
                }),
            )
            .await?;

        let created: Ticket = decode_row(row)?;
        info!("Ticket {} opened by {}", created.id, user_id);
        Ok(created)
    }

    pub async fn update_status(&self, id: &str, status: TicketStatus) -> Result<Ticket, ServiceError> {
        let row = self
            .store
            .update(tables::TICKETS, id, json!({ "status": status }))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ServiceError::NotFound(format!("Ticket {}", id)),
                other => ServiceError::Store(other),
            })?;

        info!("Ticket {} moved to {}", id, status.as_str());
        Ok(decode_row(row)?)
    }

    /// Live changes to one customer's tickets
    pub async fn watch_for_user(&self, user_id: &str) -> Result<Subscription, ServiceError> {
        Ok(self
            .store
            .subscribe(tables::TICKETS, Filter::new().eq("user_id", user_id))
            .await?)
    }

    pub async fn watch_all(&self) -> Result<Subscription, ServiceError> {
        Ok(self.store.subscribe(tables::TICKETS, Filter::new()).await?)
    }
}
