use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;

use super::query_builder::{insert_sql, select_sql, update_sql};
use super::store::{
    forward_changes, validate_identifier, Filter, Order, RecordChange, RecordStore, StoreError,
    Subscription,
};

const CHANGE_BUFFER: usize = 256;
const LISTENER_RETRY: Duration = Duration::from_secs(1);

/// Record store over a Postgres database. Live changes arrive through
/// LISTEN/NOTIFY; `sql/schema.sql` installs the trigger that emits them.
///
/// One listener connection per store, opened on the first `subscribe`, feeds
/// every subscriber through a broadcast channel.
pub struct PgRecordStore {
    pool: PgPool,
    realtime_channel: String,
    changes: broadcast::Sender<RecordChange>,
    listener: OnceCell<JoinHandle<()>>,
}

impl PgRecordStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if config.url.is_empty() {
            return Err(StoreError::ConnectionError("DATABASE_URL is not configured".to_string()));
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&config.url)
            .await?;

        info!("Created database pool ({} max connections)", config.max_connections);
        Ok(Self::from_pool(pool, config.realtime_channel.clone()))
    }

    pub fn from_pool(pool: PgPool, realtime_channel: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            realtime_channel: realtime_channel.into(),
            changes,
            listener: OnceCell::new(),
        }
    }

    /// Start the shared listener unless it is already running
    async fn ensure_listener(&self) -> Result<(), StoreError> {
        self.listener
            .get_or_try_init(|| async {
                let mut listener = PgListener::connect_with(&self.pool).await?;
                listener.listen(&self.realtime_channel).await?;
                info!("Listening for record changes on '{}'", self.realtime_channel);

                let changes = self.changes.clone();
                Ok::<_, StoreError>(tokio::spawn(async move {
                    loop {
                        match listener.recv().await {
                            Ok(notification) => {
                                if let Some(change) = parse_notification(notification.payload()) {
                                    // No subscribers right now is fine
                                    let _ = changes.send(change);
                                }
                            }
                            Err(e) => {
                                // PgListener reconnects on the next recv
                                error!("Realtime listener error: {}", e);
                                tokio::time::sleep(LISTENER_RETRY).await;
                            }
                        }
                    }
                }))
            })
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

impl Drop for PgRecordStore {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get() {
            task.abort();
        }
    }
}

fn parse_notification(payload: &str) -> Option<RecordChange> {
    match serde_json::from_str(payload) {
        Ok(change) => Some(change),
        Err(e) => {
            warn!("Ignoring malformed change notification: {}", e);
            None
        }
    }
}

fn row_value(row: &PgRow) -> Result<Value, StoreError> {
    Ok(row.try_get::<Value, _>("row")?)
}

fn object(value: Value) -> Result<serde_json::Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRecord(format!("expected a JSON object, got {}", other))),
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        let sql = select_sql(table, filter, order)?;
        let rows = sql.bind().fetch_all(&self.pool).await?;
        rows.iter().map(row_value).collect()
    }

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        let sql = insert_sql(table, &object(record)?)?;
        let row = sql.bind().fetch_one(&self.pool).await?;
        row_value(&row)
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let sql = update_sql(table, id, &object(patch)?)?;
        match sql.bind().fetch_optional(&self.pool).await? {
            Some(row) => row_value(&row),
            None => Err(StoreError::NotFound(format!("{} {} not found", table, id))),
        }
    }

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<Subscription, StoreError> {
        validate_identifier(table)?;
        self.ensure_listener().await?;
        debug!("New '{}' subscriber ({} total)", table, self.changes.receiver_count() + 1);
        Ok(forward_changes(&self.changes, table, filter))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
