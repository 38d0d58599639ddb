use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AuthStore, FailedLogin};
use crate::auth::{Account, NewAccount, NewRefreshToken, RefreshTokenRecord};
use crate::error::DatabaseError;

#[derive(Default)]
struct Tables {
    accounts: HashMap<i64, Account>,
    refresh_tokens: Vec<RefreshTokenRecord>,
    next_account_id: i64,
    next_token_id: i64,
}

/// In-memory store with the same constraints as the SQL schema
/// (unique email, unique token digest, tokens tied to an existing account).
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, DatabaseError> {
        self.tables
            .lock()
            .map_err(|_| DatabaseError::ConnectionPool("memory store lock poisoned".to_string()))
    }

    fn account_mut<'a>(tables: &'a mut Tables, id: i64) -> Result<&'a mut Account, DatabaseError> {
        tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", id)))
    }

    /// Flip the active flag. Disabling accounts happens outside the auth core.
    pub fn set_active(&self, id: i64, is_active: bool) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        Self::account_mut(&mut tables, id)?.is_active = is_active;
        Ok(())
    }

    /// Overwrite the lock expiry, e.g. to simulate the lock period elapsing
    pub fn set_locked_until(
        &self,
        id: i64,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        Self::account_mut(&mut tables, id)?.locked_until = locked_until;
        Ok(())
    }

    /// Every token row of an account, revoked or not
    pub fn refresh_tokens_of(&self, user_id: i64) -> Result<Vec<RefreshTokenRecord>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_id(&self, id: i64) -> Result<Option<Account>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn admin_exists(&self) -> Result<bool, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .accounts
            .values()
            .any(|a| a.role == crate::auth::Role::Admin))
    }

    async fn insert_account(&self, account: NewAccount) -> Result<Account, DatabaseError> {
        let mut tables = self.tables()?;
        if tables.accounts.values().any(|a| a.email == account.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "users_email_key".to_string(),
            ));
        }

        tables.next_account_id += 1;
        let created = Account {
            id: tables.next_account_id,
            email: account.email,
            password_hash: account.password_hash,
            name: account.name,
            role: account.role,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: account.created_at,
            updated_at: None,
        };
        tables.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn record_failed_login(
        &self,
        id: i64,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FailedLogin, DatabaseError> {
        let mut tables = self.tables()?;
        let account = Self::account_mut(&mut tables, id)?;

        account.failed_login_attempts += 1;
        if account.failed_login_attempts >= max_attempts {
            account.locked_until = Some(lock_until);
        }
        account.updated_at = Some(now);

        Ok(FailedLogin {
            attempts: account.failed_login_attempts,
            locked_until: account.locked_until,
        })
    }

    async fn record_successful_login(&self, id: i64, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        let account = Self::account_mut(&mut tables, id)?;

        account.failed_login_attempts = 0;
        account.locked_until = None;
        account.last_login_at = Some(now);
        account.updated_at = Some(now);
        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        let account = Self::account_mut(&mut tables, id)?;

        account.password_hash = password_hash.to_string();
        account.updated_at = Some(now);
        Ok(())
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<(), DatabaseError> {
        let mut tables = self.tables()?;
        if !tables.accounts.contains_key(&token.user_id) {
            return Err(DatabaseError::QueryExecution(format!(
                "refresh_tokens.user_id {} violates foreign key",
                token.user_id
            )));
        }
        if tables
            .refresh_tokens
            .iter()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            ));
        }

        tables.next_token_id += 1;
        let id = tables.next_token_id;
        tables.refresh_tokens.push(RefreshTokenRecord {
            id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            revoked_at: None,
            created_at: token.created_at,
        });
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .refresh_tokens
            .iter()
            .find(|t| t.token_hash == token_hash && t.expires_at > now)
            .cloned())
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut tables = self.tables()?;
        match tables
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && t.revoked_at.is_none())
        {
            Some(token) => {
                token.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_account_tokens(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut tables = self.tables()?;
        let mut revoked = 0;
        for token in tables
            .refresh_tokens
            .iter_mut()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
        {
            token.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn active_refresh_tokens(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, DatabaseError> {
        let tables = self.tables()?;
        Ok(tables
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.is_usable(now))
            .cloned()
            .collect())
    }
}
