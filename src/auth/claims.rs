//! JWT claim sets for access and refresh tokens (RFC 7519 registered claims
//! plus the account fields each token needs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::models::{Account, Role};
use crate::error::{AppError, AuthError};

/// Type marker carried by every refresh token
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims of a short-lived access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Subject (account id)
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl AccessClaims {
    pub fn new(account: &Account, issued_at: DateTime<Utc>, expiry_seconds: i64, issuer: &str) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role,
            iat,
            exp: iat + expiry_seconds,
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }
}

/// Claims of a long-lived refresh token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: String,
    /// Unique per token so two tokens minted in the same second never collide
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl RefreshClaims {
    pub fn new(user_id: i64, issued_at: DateTime<Utc>, expiry_seconds: i64, issuer: &str) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: user_id.to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat,
            exp: iat + expiry_seconds,
            iss: issuer.to_string(),
        }
    }

    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Auth(AuthError::InvalidRefreshToken))
    }
}
