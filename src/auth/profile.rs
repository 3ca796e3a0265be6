use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ProfileConfig;
use crate::database::{decode_row, tables, Filter, Order, RecordStore, StoreError};
use crate::types::{Profile, Role};

/// Outcome of reading a profile row. A missing row is an expected outcome,
/// distinct from a failing store.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLookup {
    Found(Profile),
    NotFound,
    Error(String),
}

/// Column values for a newly created profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDefaults {
    pub full_name: String,
    pub role: Role,
}

impl ProfileDefaults {
    /// Profile synthesized when a valid session has no row
    pub fn self_heal(config: &ProfileConfig) -> Self {
        Self {
            full_name: config.default_full_name.clone(),
            role: Role::Customer,
        }
    }

    /// Profile written right after sign-up
    pub fn signup(config: &ProfileConfig) -> Self {
        Self {
            full_name: config.signup_full_name.clone(),
            role: Role::Customer,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileCreateError {
    /// Another writer created the row first
    #[error("Profile already exists")]
    DuplicateKey,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProfileCreateError {
    fn from(err: StoreError) -> Self {
        if err.is_duplicate_key() {
            ProfileCreateError::DuplicateKey
        } else {
            ProfileCreateError::Store(err)
        }
    }
}

/// Profile reads and writes over the `profiles` table
#[derive(Clone)]
pub struct ProfileStore {
    store: Arc<dyn RecordStore>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, user_id: &str) -> ProfileLookup {
        let filter = Filter::new().eq("id", user_id);
        let mut rows = match self.store.select(tables::PROFILES, &filter, None).await {
            Ok(rows) => rows,
            Err(e) => return ProfileLookup::Error(e.to_string()),
        };

        match rows.len() {
            0 => ProfileLookup::NotFound,
            1 => match decode_row::<Profile>(rows.remove(0)) {
                Ok(profile) => ProfileLookup::Found(profile),
                Err(e) => ProfileLookup::Error(e.to_string()),
            },
            n => ProfileLookup::Error(format!("{} profiles share id {}", n, user_id)),
        }
    }

    pub async fn create(&self, user_id: &str, defaults: &ProfileDefaults) -> Result<Profile, ProfileCreateError> {
        let record = json!({
            "id": user_id,
            "role": defaults.role,
            "full_name": defaults.full_name,
        });
        let row = self.store.insert(tables::PROFILES, record).await?;
        Ok(decode_row(row)?)
    }

    /// Every profile, newest first
    pub async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        let rows = self
            .store
            .select(tables::PROFILES, &Filter::new(), Some(&Order::desc("created_at")))
            .await?;
        crate::database::decode_rows(rows)
    }
}
