use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::events::{AuthEvent, AuthEventHub, AuthSubscription};
use super::revoked::RevokedTokens;
use super::{IdentityError, IdentityProvider, SignUpMetadata, User};
use crate::auth::jwt::{generate_jwt, validate_jwt, Claims};
use crate::auth::Session;
use crate::config::IdentityConfig;

struct StoredUser {
    user: User,
    password: String,
}

/// In-process identity provider for development and tests. Issues HS256
/// access tokens signed with the configured secret.
pub struct MemoryIdentityProvider {
    secret: String,
    ttl_secs: u64,
    users: RwLock<HashMap<String, StoredUser>>,
    current: RwLock<Option<Session>>,
    revoked: RevokedTokens,
    hub: AuthEventHub,
}

impl MemoryIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            ttl_secs: config.token_ttl_secs,
            users: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            revoked: RevokedTokens::new(),
            hub: AuthEventHub::new(),
        }
    }

    fn issue_session(&self, user: &User) -> Result<Session, IdentityError> {
        let claims = Claims::new(&user.id, user.email.as_deref(), self.ttl_secs);
        let token = generate_jwt(&claims, &self.secret)?;
        Ok(claims.into_session(token))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        let current = self.current.read().await;
        Ok(current.as_ref().filter(|s| s.is_valid()).cloned())
    }

    async fn session_for_token(&self, access_token: &str) -> Result<Option<Session>, IdentityError> {
        if self.revoked.contains(access_token).await {
            debug!("Rejected revoked access token");
            return Ok(None);
        }

        match validate_jwt(access_token, &self.secret) {
            Ok(claims) => Ok(Some(claims.into_session(access_token))),
            Err(e) => {
                debug!("Access token failed validation: {}", e);
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let user = {
            let users = self.users.read().await;
            match users.get(&normalize_email(email)) {
                Some(stored) if stored.password == password => stored.user.clone(),
                _ => return Err(IdentityError::InvalidCredentials),
            }
        };

        let session = self.issue_session(&user)?;
        *self.current.write().await = Some(session.clone());
        info!("User {} signed in", user.id);
        self.hub.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<User, IdentityError> {
        let key = normalize_email(email);
        let mut users = self.users.write().await;
        if users.contains_key(&key) {
            return Err(IdentityError::Rejected("User already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: Some(key.clone()),
            user_metadata: json!({
                "full_name": metadata.full_name,
                "role": metadata.role,
            }),
        };
        users.insert(
            key,
            StoredUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if let Some(session) = self.current.write().await.take() {
            self.revoked.revoke(&session.access_token).await;
        }
        self.hub.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn revoke_session(&self, access_token: &str) -> Result<(), IdentityError> {
        self.revoked.revoke(access_token).await;

        let mut current = self.current.write().await;
        if current.as_ref().map_or(false, |s| s.access_token == access_token) {
            *current = None;
            self.hub.emit(AuthEvent::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::types::Role;

    fn provider() -> MemoryIdentityProvider {
        MemoryIdentityProvider::new(&AppConfig::development().identity)
    }

    fn metadata() -> SignUpMetadata {
        SignUpMetadata {
            full_name: "New Customer".to_string(),
            role: Role::Customer,
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_emits_signed_in() {
        let idp = provider();
        let user = idp.sign_up("Ana@Example.com", "secret1", metadata()).await.unwrap();
        assert_eq!(user.user_metadata["role"], "customer");

        let mut events = idp.subscribe();
        let session = idp.sign_in_with_password("ana@example.com", "secret1").await.unwrap();
        assert_eq!(session.user_id, user.id);
        assert_eq!(events.recv().await, Some(AuthEvent::SignedIn(session.clone())));
        assert_eq!(idp.current_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let idp = provider();
        idp.sign_up("a@b.co", "secret1", metadata()).await.unwrap();
        let err = idp.sign_up("a@b.co", "secret2", metadata()).await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let idp = provider();
        idp.sign_up("a@b.co", "secret1", metadata()).await.unwrap();
        let err = idp.sign_in_with_password("a@b.co", "nope").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn revoked_tokens_stop_resolving() {
        let idp = provider();
        idp.sign_up("a@b.co", "secret1", metadata()).await.unwrap();
        let session = idp.sign_in_with_password("a@b.co", "secret1").await.unwrap();

        let resolved = idp.session_for_token(&session.access_token).await.unwrap();
        assert_eq!(resolved.map(|s| s.user_id), Some(session.user_id.clone()));

        let mut events = idp.subscribe();
        idp.revoke_session(&session.access_token).await.unwrap();
        assert_eq!(events.recv().await, Some(AuthEvent::SignedOut));
        assert!(idp.session_for_token(&session.access_token).await.unwrap().is_none());
        assert!(idp.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_tokens_resolve_to_none() {
        let idp = provider();
        assert!(idp.session_for_token("not-a-jwt").await.unwrap().is_none());
    }
}
