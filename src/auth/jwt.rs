use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifetime of the single-use tokens sent by email.
pub const EMAIL_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    PasswordSet,
    EmailVerification,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub typ: TokenKind,
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: Uuid,
}

impl Claims {
    pub fn new(kind: TokenKind, subject: impl Into<String>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self {
            sub: subject.into(),
            typ: kind,
            exp: (Utc::now() + ttl).timestamp(),
            jti: Uuid::new_v4(),
        }
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("JWT encode failed: {e}"))
}

/// Decode a token and check that it was issued for `kind`.
pub fn verify(token: &str, kind: TokenKind, secret: &str) -> Result<Claims, String> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| format!("JWT decode failed: {e}"))?;

    if claims.typ != kind {
        return Err(format!(
            "Token kind mismatch: expected {kind:?}, got {:?}",
            claims.typ
        ));
    }
    Ok(claims)
}

pub fn issue(kind: TokenKind, subject: &str, ttl: Duration, secret: &str) -> Result<String, String> {
    encode_token(&Claims::new(kind, subject, ttl), secret)
}

pub fn issue_access(user_id: Uuid, ttl: Duration, secret: &str) -> Result<String, String> {
    issue(TokenKind::Access, &user_id.to_string(), ttl, secret)
}

/// Verify an access token and return the user id it was issued for.
pub fn verify_access(token: &str, secret: &str) -> Result<Uuid, String> {
    let claims = verify(token, TokenKind::Access, secret)?;
    claims
        .sub
        .parse()
        .map_err(|e| format!("Invalid subject: {e}"))
}
