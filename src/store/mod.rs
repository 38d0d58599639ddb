//! Credential and token stores
//!
//! The authentication core talks to persistence only through [`AuthStore`].
//! `PgStore` is the production implementation; `MemoryStore` keeps the same
//! contract in process for tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{Account, NewAccount, NewRefreshToken, RefreshTokenRecord};
use crate::error::DatabaseError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Counter state written by a failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError>;

    async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, DatabaseError>;

    async fn admin_exists(&self) -> Result<bool, DatabaseError>;

    /// Fails with `UniqueConstraintViolation` when the email is taken
    async fn insert_account(&self, account: NewAccount) -> Result<Account, DatabaseError>;

    /// Atomically increment the failed-login counter. When the new value
    /// reaches `max_attempts`, `locked_until` is set to `lock_until`.
    async fn record_failed_login(
        &self,
        id: i64,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, DatabaseError>;

    /// Reset the counter, clear the lock and stamp the last login
    async fn record_successful_login(&self, id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError>;

    async fn update_password_hash(
        &self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<(), DatabaseError>;

    /// The row for `token_hash`, if one exists and has not expired at `now`.
    /// Revoked rows are returned so the caller can tell them apart.
    async fn find_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, DatabaseError>;

    /// Revoke one token. Returns false when nothing active matched.
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Revoke every active token of an account, returning how many were revoked
    async fn revoke_account_tokens(&self, user_id: i64, now: DateTime<Utc>)
        -> Result<u64, DatabaseError>;

    /// Unrevoked, unexpired tokens of an account
    async fn active_refresh_tokens(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, DatabaseError>;
}
