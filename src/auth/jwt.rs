//! JWT token generation and validation
//!
//! `TokenIssuer` holds the signing keys for both token kinds. It is built once
//! from `JwtSettings` and shared read-only afterwards.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{AccessClaims, RefreshClaims, REFRESH_TOKEN_TYPE};
use crate::auth::models::Account;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// A freshly signed refresh token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
            issuer: config.issuer.clone(),
        }
    }

    /// Access token lifetime in seconds
    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_token_expiry(&self) -> i64 {
        self.refresh_token_expiry
    }

    pub fn generate_access_token(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = AccessClaims::new(account, now, self.access_token_expiry, &self.issuer);

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    pub fn generate_refresh_token(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<IssuedRefreshToken, AppError> {
        let claims = RefreshClaims::new(user_id, now, self.refresh_token_expiry, &self.issuer);
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Refresh token expiry out of range".to_string()))?;

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(IssuedRefreshToken { token, expires_at })
    }

    /// Validate an access token
    ///
    /// # Errors
    /// `TOKEN_EXPIRED` when the embedded expiry has passed, `INVALID_TOKEN`
    /// for anything else (bad signature, wrong issuer, malformed payload).
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Access token validation error: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
                    _ => AppError::Auth(AuthError::TokenInvalid),
                }
            })
    }

    /// Validate the signature, structure, issuer, expiry and type marker of a
    /// refresh token. Store membership is checked separately.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        let claims = decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Refresh token validation error: {}", e);
                AppError::Auth(AuthError::InvalidRefreshToken)
            })?;

        if claims.token_type != REFRESH_TOKEN_TYPE {
            tracing::warn!(token_type = %claims.token_type, "Unexpected refresh token type");
            return Err(AppError::Auth(AuthError::InvalidRefreshToken));
        }

        Ok(claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        validation
    }
}
