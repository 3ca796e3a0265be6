use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::identity::{IdentityError, IdentityProvider};

/// Identity-provider session. Held only for the duration of a resolution;
/// the state machine never persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Subject id, which is also the profile primary key
    pub user_id: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid(&self) -> bool {
        !self.user_id.is_empty() && self.expires_at > Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Provider(#[from] IdentityError),

    #[error("Session is invalid or expired")]
    InvalidToken,
}

/// Produces the session a bootstrap should run against
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self) -> Result<Option<Session>, SessionError>;
}

/// Asks the identity provider for the session it currently holds
pub struct ProviderSessionResolver {
    provider: Arc<dyn IdentityProvider>,
}

impl ProviderSessionResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SessionResolver for ProviderSessionResolver {
    async fn resolve(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.provider.current_session().await?)
    }
}

/// Resolves the session carried by a request's bearer token
pub struct BearerSessionResolver {
    token: Option<String>,
    provider: Arc<dyn IdentityProvider>,
}

impl BearerSessionResolver {
    pub fn new(token: Option<String>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { token, provider }
    }
}

#[async_trait]
impl SessionResolver for BearerSessionResolver {
    async fn resolve(&self) -> Result<Option<Session>, SessionError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        match self.provider.session_for_token(token).await? {
            Some(session) if session.is_valid() => Ok(Some(session)),
            Some(_) => Err(SessionError::InvalidToken),
            None => Ok(None),
        }
    }
}
