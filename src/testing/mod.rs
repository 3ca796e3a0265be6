use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Barrier, Semaphore};

use crate::auth::{Navigator, Session, SessionError, SessionResolver};
use crate::database::{tables, Filter, MemoryRecordStore, Order, RecordStore, StoreError, Subscription};
use crate::identity::IdentityError;
use crate::types::Role;

/// A valid session for `user_id`, expiring in an hour
pub fn session_for(user_id: &str) -> Session {
    Session {
        user_id: user_id.to_string(),
        access_token: format!("token-{}", user_id),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub async fn seed_profile(store: &dyn RecordStore, id: &str, role: Role, full_name: &str) {
    store
        .insert(tables::PROFILES, json!({ "id": id, "role": role, "full_name": full_name }))
        .await
        .unwrap_or_else(|e| panic!("failed to seed profile {}: {}", id, e));
}

/// Resolver that always answers with the same session (or none)
pub struct FixedSession(pub Option<Session>);

#[async_trait]
impl SessionResolver for FixedSession {
    async fn resolve(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.0.clone())
    }
}

/// Resolver whose identity provider is unreachable
pub struct UnreachableIdentity;

#[async_trait]
impl SessionResolver for UnreachableIdentity {
    async fn resolve(&self) -> Result<Option<Session>, SessionError> {
        Err(SessionError::Provider(IdentityError::Unavailable("connection refused".to_string())))
    }
}

/// Failure a `ScriptedStore` injects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Query,
    Connection,
    Duplicate,
}

impl Fault {
    fn error(self, table: &str) -> StoreError {
        match self {
            Fault::Query => StoreError::QueryError(format!("permission denied for table {}", table)),
            Fault::Connection => StoreError::ConnectionError("connection reset by peer".to_string()),
            Fault::Duplicate => StoreError::DuplicateKey(format!("{}_pkey", table)),
        }
    }
}

/// In-memory store with call counters, injected faults and optional
/// synchronisation points on `select`
pub struct ScriptedStore {
    pub inner: MemoryRecordStore,
    selects: AtomicUsize,
    inserts: AtomicUsize,
    select_fault: Mutex<Option<Fault>>,
    insert_fault: Mutex<Option<Fault>>,
    barrier: Option<Arc<Barrier>>,
    barrier_remaining: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            selects: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            select_fault: Mutex::new(None),
            insert_fault: Mutex::new(None),
            barrier: None,
            barrier_remaining: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// The first `parties` selects wait for each other before returning
    pub fn with_select_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self.barrier_remaining = AtomicUsize::new(parties);
        self
    }

    /// Every select first takes a permit from `gate`
    pub fn with_select_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn fail_selects(&self, fault: Fault) {
        *self.select_fault.lock().unwrap() = Some(fault);
    }

    pub fn fail_inserts(&self, fault: Fault) {
        *self.insert_fault.lock().unwrap() = Some(fault);
    }

    pub fn select_calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.select_calls() + self.insert_calls()
    }
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(fault) = *self.select_fault.lock().unwrap() {
            return Err(fault.error(table));
        }

        let rows = self.inner.select(table, filter, order).await?;

        if let Some(barrier) = &self.barrier {
            let take = self
                .barrier_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if take {
                barrier.wait().await;
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, record: Value) -> Result<Value, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = *self.insert_fault.lock().unwrap() {
            return Err(fault.error(table));
        }
        self.inner.insert(table, record).await
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        self.inner.update(table, id, patch).await
    }

    async fn subscribe(&self, table: &str, filter: Filter) -> Result<Subscription, StoreError> {
        self.inner.subscribe(table, filter).await
    }
}

/// Navigator that records every replace call
#[derive(Default)]
pub struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}
