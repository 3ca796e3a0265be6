//! Identity provider seam: sign-in, sign-up, sign-out, token checks and
//! the auth event feed.

pub mod events;
pub mod gotrue;
pub mod memory;
pub mod revoked;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::auth::jwt::JwtError;
use crate::auth::Session;
use crate::types::Role;

pub use events::{AuthEvent, AuthEventHub, AuthSubscription};
pub use gotrue::GoTrueClient;
pub use memory::MemoryIdentityProvider;
pub use revoked::RevokedTokens;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Rejected by identity provider: {0}")]
    Rejected(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected identity provider response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            IdentityError::Unavailable(err.to_string())
        } else {
            IdentityError::Protocol(err.to_string())
        }
    }
}

impl From<JwtError> for IdentityError {
    fn from(err: JwtError) -> Self {
        IdentityError::InvalidToken(err.to_string())
    }
}

/// Account as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

/// Metadata attached to the account at sign-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    pub full_name: String,
    pub role: Role,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session held by this client, if any and still valid
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Resolve a bearer access token to its session. `Ok(None)` when the
    /// provider does not recognise the token.
    async fn session_for_token(&self, access_token: &str) -> Result<Option<Session>, IdentityError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<User, IdentityError>;

    /// End the current session and emit `SignedOut`
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Revoke a specific access token (gateway logout)
    async fn revoke_session(&self, access_token: &str) -> Result<(), IdentityError>;

    fn subscribe(&self) -> AuthSubscription;
}
