use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::store::{
    forward_changes, validate_identifier, ChangeKind, Filter, Order, RecordChange, RecordStore,
    StoreError, Subscription,
};

const CHANGE_BUFFER: usize = 256;

/// In-process record store. Tables are created on first insert; `id` is the
/// primary key and `created_at` defaults to now, as the relational schema does.
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
    changes: broadcast::Sender<RecordChange>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            tables: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Number of rows currently stored in a table
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Vec::len)
    }

    fn publish(&self, change: RecordChange) {
        // No receivers is the common case and not an error
        let _ = self.changes.send(change);
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn into_object(record: Value) -> Result<Map<String, Value>, StoreError> {
    match record {
        Value::Object(map) => {
            for column in map.keys() {
                validate_identifier(column)?;
            }
            Ok(map)
        }
        other => Err(StoreError::InvalidRecord(format!("expected a JSON object, got {}", other))),
    }
}

fn row_id(row: &Map<String, Value>) -> Option<String> {
    row.get("id").map(super::store::value_text)
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        validate_identifier(table)?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|row| Value::Object(row.clone()))
                    .filter(|row| filter.matches(row))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        validate_identifier(table)?;
        let mut row = into_object(record)?;
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            row.insert("created_at".to_string(), Value::String(now));
        }

        let stored = {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table.to_string()).or_default();
            let id = row_id(&row);
            if rows.iter().any(|existing| row_id(existing) == id) {
                return Err(StoreError::DuplicateKey(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                )));
            }
            rows.push(row.clone());
            Value::Object(row)
        };

        self.publish(RecordChange {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            record: stored.clone(),
            old_record: None,
        });
        Ok(stored)
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        validate_identifier(table)?;
        let patch = into_object(patch)?;

        let (old, new) = {
            let mut tables = self.tables.write().await;
            let row = tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| row_id(row).as_deref() == Some(id)))
                .ok_or_else(|| StoreError::NotFound(format!("{} {} not found", table, id)))?;

            let old = Value::Object(row.clone());
            for (column, value) in patch {
                if column != "id" {
                    row.insert(column, value);
                }
            }
            (old, Value::Object(row.clone()))
        };

        self.publish(RecordChange {
            table: table.to_string(),
            kind: ChangeKind::Update,
            record: new.clone(),
            old_record: Some(old),
        });
        Ok(new)
    }

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<Subscription, StoreError> {
        validate_identifier(table)?;
        Ok(forward_changes(&self.changes, table, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_applies_defaults_and_rejects_duplicates() {
        let store = MemoryRecordStore::new();
        let row = store.insert("profiles", json!({ "id": "u1", "role": "customer" })).await.unwrap();
        assert_eq!(row["id"], "u1");
        assert!(row["created_at"].is_string());

        let err = store.insert("profiles", json!({ "id": "u1", "role": "admin" })).await.unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.row_count("profiles").await, 1);
    }

    #[tokio::test]
    async fn insert_generates_ids() {
        let store = MemoryRecordStore::new();
        let a = store.insert("tickets", json!({ "title": "a" })).await.unwrap();
        let b = store.insert("tickets", json!({ "title": "b" })).await.unwrap();
        assert_ne!(a["id"], b["id"]);
    }

    #[tokio::test]
    async fn select_filters_and_orders() {
        let store = MemoryRecordStore::new();
        store.insert("tickets", json!({ "id": "1", "user_id": "u1", "created_at": "2024-01-01T00:00:00Z" })).await.unwrap();
        store.insert("tickets", json!({ "id": "2", "user_id": "u2", "created_at": "2024-01-02T00:00:00Z" })).await.unwrap();
        store.insert("tickets", json!({ "id": "3", "user_id": "u1", "created_at": "2024-01-03T00:00:00Z" })).await.unwrap();

        let rows = store
            .select("tickets", &Filter::new().eq("user_id", "u1"), Some(&Order::desc("created_at")))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn update_patches_but_keeps_id() {
        let store = MemoryRecordStore::new();
        store.insert("tickets", json!({ "id": "t1", "status": "open" })).await.unwrap();
        let row = store.update("tickets", "t1", json!({ "status": "resolved", "id": "other" })).await.unwrap();
        assert_eq!(row["status"], "resolved");
        assert_eq!(row["id"], "t1");

        let err = store.update("tickets", "missing", json!({ "status": "open" })).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn subscribers_receive_matching_changes() {
        let store = MemoryRecordStore::new();
        let mut sub = store.subscribe("tickets", Filter::new().eq("user_id", "u1")).await.unwrap();

        store.insert("tickets", json!({ "id": "t1", "user_id": "u2" })).await.unwrap();
        store.insert("payments", json!({ "id": "p1", "user_id": "u1" })).await.unwrap();
        store.insert("tickets", json!({ "id": "t2", "user_id": "u1" })).await.unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.record["id"], "t2");
    }

    #[tokio::test]
    async fn rejects_non_object_records() {
        let store = MemoryRecordStore::new();
        let err = store.insert("tickets", json!(["not", "a", "row"])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }
}
