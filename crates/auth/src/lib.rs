use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::SubjectId;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Why a handshake credential was rejected. Rejection happens before any
/// connection state exists, so the only observable side effect is the refused
/// handshake itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication token missing")]
    Missing,
    #[error("authentication token invalid")]
    Invalid,
    #[error("authentication token expired")]
    Expired,
}

#[derive(Debug, Error)]
#[error("failed to sign session token: {0}")]
pub struct IssuanceError(#[from] jsonwebtoken::errors::Error);

/// Mints a short-lived credential for one socket handshake. Tokens are
/// re-issued per connection attempt, never renewed.
pub fn mint_session_token(
    cfg: &TokenConfig,
    subject: &SubjectId,
) -> Result<String, IssuanceError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: subject.0.clone(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )?)
}

/// Checks signature and expiry and extracts the authenticated subject.
pub fn verify_session_token(
    cfg: &TokenConfig,
    token: Option<&str>,
) -> Result<SubjectId, AuthError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return Err(AuthError::Missing),
    };

    let mut validation = Validation::default();
    // default leeway would accept tokens up to 60s past expiry
    validation.leeway = 0;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Ok(SubjectId::from(data.claims.sub)),
        Err(err) => match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::Expired),
            _ => Err(AuthError::Invalid),
        },
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
