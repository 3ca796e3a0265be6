use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::Session;

/// Audience carried by identity-provider access tokens
pub const AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: &str, email: Option<&str>, ttl_secs: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::seconds(ttl_secs as i64)).timestamp();

        Self {
            sub: user_id.to_string(),
            aud: AUDIENCE.to_string(),
            email: email.map(str::to_string),
            exp,
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }

    pub fn into_session(self, access_token: impl Into<String>) -> Session {
        let expires_at = self.expires_at();
        Session {
            user_id: self.sub,
            access_token: access_token.into(),
            expires_at,
        }
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidToken(String),
    InvalidSecret,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidToken(msg) => write!(f, "Invalid JWT token: {}", msg),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
        }
    }
}

impl std::error::Error for JwtError {}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    let header = Header::default();

    encode(&header, claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Validate signature, expiry and audience, returning the claims
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.set_audience(&[AUDIENCE]);

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

/// Read claims without checking the signature. Only for tokens the
/// identity provider has already accepted.
pub fn read_unverified(token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}
