use async_trait::async_trait;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

const SUBSCRIPTION_BUFFER: usize = 256;

/// Errors from record store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violation; another writer already holds the key
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateKey(db.message().to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
                StoreError::ConnectionError(e.to_string())
            }
            other => StoreError::QueryError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidRecord(err.to_string())
    }
}

/// Equality filter over top-level columns, AND-combined
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a JSON row
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|(column, expected)| {
            let actual = row.get(column).unwrap_or(&Value::Null);
            values_equal(actual, expected)
        })
    }
}

/// Compare the way the Postgres backend does: by text representation
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => value_text(actual) == value_text(expected),
    }
}

/// Text form of a scalar, used for filter binding and comparisons
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }

    /// Ordering of two rows by this column. Nulls sort as the largest value,
    /// so they come last ascending and first descending.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = a.get(&self.column).unwrap_or(&Value::Null);
        let right = b.get(&self.column).unwrap_or(&Value::Null);
        let ord = compare_values(left, right);
        if self.ascending { ord } else { ord.reverse() }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => value_text(a).cmp(&value_text(b)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row change delivered to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChange {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub record: Value,
    #[serde(default)]
    pub old_record: Option<Value>,
}

/// Live change feed for one table. Dropping it stops the forwarding task.
pub struct Subscription {
    rx: mpsc::Receiver<RecordChange>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<RecordChange>, task: JoinHandle<()>) -> Self {
        Self { rx, task }
    }

    pub async fn next(&mut self) -> Option<RecordChange> {
        self.rx.recv().await
    }
}

/// Subscribe to a store-wide change feed, keeping changes to `table` that
/// match `filter`. Every subscriber shares the one upstream source.
pub fn forward_changes(changes: &broadcast::Sender<RecordChange>, table: &str, filter: Filter) -> Subscription {
    let mut changes = changes.subscribe();
    let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
    let table = table.to_string();

    let task = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    if change.table != table || !filter.matches(&change.record) {
                        continue;
                    }
                    if tx.send(change).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription on '{}' lagged, {} changes skipped", table, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    Subscription::new(rx, task)
}

impl Stream for Subscription {
    type Item = RecordChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Generic row store: the relational backend behind profiles, tickets and payments
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert a row and return it as stored (with defaults applied)
    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError>;

    /// Patch the row with the given id and return the updated row
    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError>;

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<Subscription, StoreError>;

    /// Connectivity probe for `/health`
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Validate table and column names before they are spliced into SQL.
/// Accepts [A-Za-z_][A-Za-z0-9_]* up to 63 bytes.
pub fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(row)?)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(decode_row).collect()
}
