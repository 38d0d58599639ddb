//! Authentication module
//!
//! Credential verification with account lockout, JWT access/refresh token
//! issuance, refresh-token revocation and the password policy.

mod claims;
mod jwt;
mod models;
mod password;
mod refresh_token;
mod service;

pub use claims::{AccessClaims, RefreshClaims, REFRESH_TOKEN_TYPE};
pub use jwt::{IssuedRefreshToken, TokenIssuer};
pub use models::{
    Account, AccountState, AuthSession, NewAccount, NewRefreshToken, PublicAccount,
    RefreshTokenRecord, RefreshedTokens, Role,
};
pub use password::{
    hash_password, validate_password_strength, verify_password, PasswordViolation,
    SPECIAL_CHARACTERS,
};
pub use refresh_token::hash_token;
pub use service::{AuthService, LOCKOUT_MINUTES, MAX_FAILED_LOGIN_ATTEMPTS};
