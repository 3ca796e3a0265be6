pub mod customer_service;
pub mod payment_service;
pub mod ticket_service;

pub use customer_service::CustomerService;
pub use payment_service::{PaymentService, ProofUpload};
pub use ticket_service::{NewTicket, TicketService};

use crate::database::StoreError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
