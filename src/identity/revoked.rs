use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::jwt::read_unverified;

/// Access tokens signed out before they expired.
///
/// Entries are kept until the token's own `exp`; after that the token fails
/// validation anyway, so every `revoke` drops the expired ones.
#[derive(Debug, Default)]
pub struct RevokedTokens {
    tokens: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn revoke(&self, access_token: &str) {
        let expires_at = match read_unverified(access_token) {
            Ok(claims) => claims.expires_at(),
            Err(e) => {
                debug!("Not tracking unreadable token: {}", e);
                return;
            }
        };

        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, exp| *exp > now);
        if expires_at > now {
            tokens.insert(access_token.to_string(), expires_at);
        }
    }

    pub async fn contains(&self, access_token: &str) -> bool {
        self.tokens.read().await.contains_key(access_token)
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }
}
