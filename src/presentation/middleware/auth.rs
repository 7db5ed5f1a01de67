//! Authentication
//!
//! Verifies HS256 JWTs issued by the identity service. The token is read from
//! the `Authorization: Bearer` header, or from the `token` cookie for browser
//! WebSocket upgrades that cannot set headers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Name of the cookie carrying the token.
pub const TOKEN_COOKIE: &str = "token";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Authenticated user, extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
}

/// Token verification with a shared secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token expired".into())
                }
                _ => AppError::Unauthorized("Invalid token".into()),
            }
        })?;

        let username = data.claims.sub.trim();
        if username.is_empty() {
            return Err(AppError::Unauthorized("Invalid token claims".into()));
        }
        Ok(AuthUser {
            username: username.to_string(),
        })
    }
}

/// Sign a token for `username`. Tokens are normally issued elsewhere; this is
/// used by local tooling and tests.
pub fn issue_token(
    secret: &str,
    username: &str,
    expires_in: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (chrono::Utc::now() + expires_in).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<JwtVerifier>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);

        let token = match bearer_token(parts) {
            Some(token) => token,
            None => CookieJar::from_headers(&parts.headers)
                .get(TOKEN_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or_else(|| AppError::Unauthorized("Missing authorization token".into()))?,
        };

        verifier.verify(&token)
    }
}
