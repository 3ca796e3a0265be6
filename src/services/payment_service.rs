use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use crate::database::{decode_row, decode_rows, tables, Filter, Order, RecordStore, StoreError};
use crate::storage::{content_type_for, FileStorage};
use crate::types::{Payment, PaymentStatus};

/// A customer's proof of a bank transfer
#[derive(Debug, Clone)]
pub struct ProofUpload {
    pub amount: Decimal,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn FileStorage>,
    bucket: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn RecordStore>, storage: Arc<dyn FileStorage>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            storage,
            bucket: bucket.into(),
        }
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Payment>, ServiceError> {
        let filter = Filter::new().eq("user_id", user_id);
        let rows = self
            .store
            .select(tables::PAYMENTS, &filter, Some(&Order::desc("payment_date")))
            .await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn list_all(&self) -> Result<Vec<Payment>, ServiceError> {
        let rows = self
            .store
            .select(tables::PAYMENTS, &Filter::new(), Some(&Order::desc("payment_date")))
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// Upload the proof to `{bucket}/{user_id}/{uuid}.{ext}` and record a
    /// pending payment pointing at it
    pub async fn submit_proof(&self, user_id: &str, upload: ProofUpload) -> Result<Payment, ServiceError> {
        if upload.amount <= Decimal::ZERO {
            return Err(ServiceError::Validation("Amount must be greater than zero".to_string()));
        }
        if upload.bytes.is_empty() {
            return Err(ServiceError::Validation("Proof file is empty".to_string()));
        }

        let extension = file_extension(&upload.file_name);
        let path = format!("{}/{}.{}", user_id, Uuid::new_v4(), extension);
        let proof_url = self
            .storage
            .upload(&self.bucket, &path, upload.bytes, content_type_for(extension))
            .await?;

        let row = self
            .store
            .insert(
                tables::PAYMENTS,
                json!({
                    "user_id": user_id,
                    "amount": upload.amount,
                    "status": PaymentStatus::Pending,
                    "proof_url": proof_url,
                    "payment_date": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                }),
            )
            .await?;

        let payment: Payment = decode_row(row)?;
        info!("Payment {} of {} submitted by {}", payment.id, payment.amount, user_id);
        Ok(payment)
    }

    /// Admin review outcome
    pub async fn update_status(&self, id: &str, status: PaymentStatus) -> Result<Payment, ServiceError> {
        let row = self
            .store
            .update(tables::PAYMENTS, id, json!({ "status": status }))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => ServiceError::NotFound(format!("Payment {}", id)),
                other => ServiceError::Store(other),
            })?;

        info!("Payment {} marked {}", id, status.as_str());
        Ok(decode_row(row)?)
    }
}

/// Text after the last dot, or the whole name when there is none
fn file_extension(file_name: &str) -> &str {
    file_name.rsplit('.').next().unwrap_or(file_name)
}
