use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::events::{AuthEvent, AuthEventHub, AuthSubscription};
use super::revoked::RevokedTokens;
use super::{IdentityError, IdentityProvider, SignUpMetadata, User};
use crate::auth::jwt::{read_unverified, validate_jwt};
use crate::auth::Session;
use crate::config::IdentityConfig;

/// REST client for a GoTrue-compatible identity provider (`/auth/v1`)
pub struct GoTrueClient {
    http: Client,
    base: Url,
    anon_key: String,
    jwt_secret: String,
    current: RwLock<Option<Session>>,
    revoked: RevokedTokens,
    hub: AuthEventHub,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => chrono::TimeZone::timestamp_opt(&Utc, at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
            (None, None) => None,
        }
        .unwrap_or_else(Utc::now);

        Session {
            user_id: self.user.id,
            access_token: self.access_token,
            expires_at,
        }
    }
}

/// Signup answers with the user directly, or with a session when
/// autoconfirm is on
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    WithSession { user: User },
    Bare(User),
}

impl GoTrueClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let base = Url::parse(&config.url)
            .map_err(|e| IdentityError::Protocol(format!("invalid identity url '{}': {}", config.url, e)))?;

        Ok(Self {
            http: Client::new(),
            base,
            anon_key: config.anon_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
            current: RwLock::new(None),
            revoked: RevokedTokens::new(),
            hub: AuthEventHub::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base
            .join(&format!("auth/v1/{}", path))
            .map_err(|e| IdentityError::Protocol(e.to_string()))
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.anon_key)
    }

    async fn logout(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .with_key(self.http.post(self.endpoint("logout")?))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            // Already-invalid tokens count as signed out
            s if s.is_success() || s == StatusCode::UNAUTHORIZED || s == StatusCode::FORBIDDEN => Ok(()),
            _ => Err(error_from(response).await),
        }
    }
}

/// Map a non-success response to an `IdentityError`
async fn error_from(response: Response) -> IdentityError {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string();

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
            if message.to_lowercase().contains("invalid login credentials") =>
        {
            IdentityError::InvalidCredentials
        }
        s if s.is_server_error() => IdentityError::Unavailable(format!("{}: {}", s, message)),
        _ => IdentityError::Rejected(message),
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        let current = self.current.read().await;
        Ok(current.as_ref().filter(|s| s.is_valid()).cloned())
    }

    async fn session_for_token(&self, access_token: &str) -> Result<Option<Session>, IdentityError> {
        // Local validation cannot see a remote logout
        if self.revoked.contains(access_token).await {
            debug!("Rejected signed-out access token");
            return Ok(None);
        }

        if !self.jwt_secret.is_empty() {
            return match validate_jwt(access_token, &self.jwt_secret) {
                Ok(claims) => Ok(Some(claims.into_session(access_token))),
                Err(e) => {
                    debug!("Access token failed local validation: {}", e);
                    Ok(None)
                }
            };
        }

        let response = self
            .with_key(self.http.get(self.endpoint("user")?))
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s if s.is_success() => {
                let user: User = response.json().await?;
                let claims = read_unverified(access_token)?;
                if claims.sub != user.id {
                    warn!("Token subject {} does not match user {}", claims.sub, user.id);
                    return Ok(None);
                }
                Ok(Some(claims.into_session(access_token)))
            }
            _ => Err(error_from(response).await),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .with_key(self.http.post(url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let session = response.json::<TokenResponse>().await?.into_session();
        *self.current.write().await = Some(session.clone());
        info!("User {} signed in", session.user_id);
        self.hub.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<User, IdentityError> {
        let response = self
            .with_key(self.http.post(self.endpoint("signup")?))
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let user = match response.json::<SignUpResponse>().await? {
            SignUpResponse::WithSession { user } | SignUpResponse::Bare(user) => user,
        };
        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let session = self.current.write().await.take();
        if let Some(session) = session {
            self.revoked.revoke(&session.access_token).await;
            if let Err(e) = self.logout(&session.access_token).await {
                warn!("Remote logout failed, clearing local session anyway: {}", e);
            }
        }
        self.hub.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn revoke_session(&self, access_token: &str) -> Result<(), IdentityError> {
        self.logout(access_token).await?;
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
