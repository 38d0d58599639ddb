//! Authentication core
//!
//! Owns every write to the credential and token stores: registration,
//! credential checks with per-account lockout, refresh-token issuance,
//! refresh, revocation and password change. All state lives in the store
//! rows; the service itself only holds the store handle and the signing keys.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::auth::claims::AccessClaims;
use crate::auth::jwt::TokenIssuer;
use crate::auth::models::{
    Account, AccountState, AuthSession, NewAccount, NewRefreshToken, PublicAccount,
    RefreshTokenRecord, RefreshedTokens, Role,
};
use crate::auth::password::{ensure_strong_password, hash_password, verify_password};
use crate::auth::refresh_token::hash_token;
use crate::configuration::{AdminSettings, AuthSettings, JwtSettings};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::AuthStore;
use crate::validators::is_valid_email;

/// Consecutive failed logins that lock an account
pub const MAX_FAILED_LOGIN_ATTEMPTS: i32 = 5;
/// How long a lock lasts
pub const LOCKOUT_MINUTES: i64 = 30;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    tokens: TokenIssuer,
    password_hash_cost: u32,
    rotate_refresh_tokens: bool,
}

impl AuthService {
    pub fn new(store: Arc<dyn AuthStore>, jwt: &JwtSettings, auth: &AuthSettings) -> Self {
        Self {
            store,
            tokens: TokenIssuer::new(jwt),
            password_hash_cost: auth.password_hash_cost,
            rotate_refresh_tokens: auth.rotate_refresh_tokens,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Create an account and open its first session
    ///
    /// # Errors
    /// - `INVALID_EMAIL`: email is not a syntactically valid address
    /// - `WEAK_PASSWORD`: password fails the strength policy
    /// - `EMAIL_EXISTS`: an account already uses this email
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: Role,
    ) -> Result<AuthSession, AppError> {
        is_valid_email(email)?;
        ensure_strong_password(password)?;

        if self.store.find_account_by_email(email).await?.is_some() {
            return Err(AuthError::EmailExists.into());
        }

        let password_hash = self.hash(password).await?;
        let now = Utc::now();
        let account = self
            .store
            .insert_account(NewAccount {
                email: email.to_string(),
                password_hash,
                name: name.to_string(),
                role,
                created_at: now,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration of the same email
                DatabaseError::UniqueConstraintViolation(_) => AppError::Auth(AuthError::EmailExists),
                other => AppError::Database(other),
            })?;

        let session = self.open_session(&account, now).await?;

        tracing::info!(user_id = account.id, role = %account.role, "User registered successfully");
        Ok(session)
    }

    /// Check credentials and open a new session
    ///
    /// # Errors
    /// - `INVALID_CREDENTIALS`: unknown email or wrong password; the latter
    ///   carries `attemptsRemaining` and, once the lock engages, `lockedUntil`
    /// - `ACCOUNT_DISABLED`: the account is inactive
    /// - `ACCOUNT_LOCKED`: the account is locked and the lock has not elapsed
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let account = match self.store.find_account_by_email(email).await? {
            Some(account) => account,
            None => {
                tracing::warn!("Login attempt for unknown email");
                return Err(AuthError::invalid_credentials().into());
            }
        };

        let now = Utc::now();
        match account.state(now) {
            AccountState::Disabled => {
                tracing::warn!(user_id = account.id, "Login attempt on disabled account");
                return Err(AuthError::AccountDisabled.into());
            }
            AccountState::Locked { until } => {
                tracing::warn!(user_id = account.id, locked_until = %until, "Login attempt on locked account");
                return Err(AuthError::AccountLocked { locked_until: until }.into());
            }
            AccountState::Unlocked => {}
        }

        if !self.verify(password, &account.password_hash).await? {
            return Err(self.register_failed_attempt(&account, now).await);
        }

        self.store.record_successful_login(account.id, now).await?;
        let session = self.open_session(&account, now).await?;

        tracing::info!(user_id = account.id, "User logged in successfully");
        Ok(session)
    }

    async fn register_failed_attempt(&self, account: &Account, now: DateTime<Utc>) -> AppError {
        let lock_until = now + Duration::minutes(LOCKOUT_MINUTES);
        let failed = match self
            .store
            .record_failed_login(account.id, MAX_FAILED_LOGIN_ATTEMPTS, lock_until, now)
            .await
        {
            Ok(failed) => failed,
            Err(e) => return e.into(),
        };

        let attempts_remaining = (MAX_FAILED_LOGIN_ATTEMPTS - failed.attempts).max(0) as u32;
        let locked_until = failed.locked_until.filter(|until| *until > now);
        if let Some(until) = locked_until {
            tracing::warn!(
                user_id = account.id,
                attempts = failed.attempts,
                locked_until = %until,
                "Account locked after repeated failed logins"
            );
        } else {
            tracing::warn!(user_id = account.id, attempts = failed.attempts, "Failed login attempt");
        }

        AuthError::InvalidCredentials {
            attempts_remaining: Some(attempts_remaining),
            locked_until,
        }
        .into()
    }

    /// Mint a new access token from a refresh token
    ///
    /// The signature alone is not enough: the token must also be recorded,
    /// unexpired and unrevoked in the token store. With rotation enabled the
    /// presented token is revoked and a replacement is returned.
    ///
    /// # Errors
    /// `INVALID_REFRESH_TOKEN`, `TOKEN_NOT_FOUND`, `TOKEN_REVOKED`, `USER_NOT_FOUND`
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedTokens, AppError> {
        let claims = self.tokens.validate_refresh_token(refresh_token)?;
        let token_hash = hash_token(refresh_token);
        let now = Utc::now();

        let record = self
            .store
            .find_refresh_token(&token_hash, now)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.revoked_at.is_some() {
            tracing::warn!(user_id = record.user_id, "Attempt to use revoked refresh token");
            return Err(AuthError::TokenRevoked.into());
        }

        if claims.user_id()? != record.user_id {
            tracing::warn!(user_id = record.user_id, "Refresh token subject does not match its owner");
            return Err(AuthError::InvalidRefreshToken.into());
        }

        let account = self
            .store
            .find_account_by_id(record.user_id)
            .await?
            .filter(|account| account.is_active)
            .ok_or(AuthError::UserNotFound)?;

        let access_token = self.tokens.generate_access_token(&account, now)?;

        // The replacement must be stored before the presented token is revoked
        let refresh_token = if self.rotate_refresh_tokens {
            let rotated = self.issue_refresh_token(account.id, now).await?;
            self.store.revoke_refresh_token(&token_hash, now).await?;
            Some(rotated)
        } else {
            None
        };

        tracing::info!(
            user_id = account.id,
            rotated = refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(RefreshedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Revoke a refresh token. Unknown or already revoked tokens are a no-op.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let revoked = self
            .store
            .revoke_refresh_token(&hash_token(refresh_token), Utc::now())
            .await?;

        if revoked {
            tracing::info!("Refresh token revoked on logout");
        } else {
            tracing::debug!("Logout with unknown or already revoked refresh token");
        }
        Ok(())
    }

    /// Replace the password and revoke every refresh token of the account
    ///
    /// # Errors
    /// `USER_NOT_FOUND`, `INVALID_CURRENT_PASSWORD`, `WEAK_PASSWORD`
    pub async fn change_password(
        &self,
        account_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.verify(current_password, &account.password_hash).await? {
            tracing::warn!(user_id = account.id, "Password change with wrong current password");
            return Err(AuthError::InvalidCurrentPassword.into());
        }

        ensure_strong_password(new_password)?;

        let password_hash = self.hash(new_password).await?;
        let now = Utc::now();
        self.store
            .update_password_hash(account.id, &password_hash, now)
            .await?;
        let revoked = self.store.revoke_account_tokens(account.id, now).await?;

        tracing::info!(user_id = account.id, revoked_tokens = revoked, "Password changed");
        Ok(())
    }

    /// Verify an access token. No store lookup.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AppError> {
        self.tokens.validate_access_token(access_token)
    }

    /// Live refresh tokens of an account
    pub async fn active_sessions(&self, account_id: i64) -> Result<Vec<RefreshTokenRecord>, AppError> {
        Ok(self
            .store
            .active_refresh_tokens(account_id, Utc::now())
            .await?)
    }

    /// Create the configured admin account unless an admin already exists
    pub async fn ensure_default_admin(
        &self,
        admin: &AdminSettings,
    ) -> Result<Option<PublicAccount>, AppError> {
        if self.store.admin_exists().await? {
            tracing::info!("Admin user already exists");
            return Ok(None);
        }

        let session = self
            .register(&admin.email, &admin.password, &admin.name, Role::Admin)
            .await?;
        tracing::info!(user_id = session.user.id, "Default admin user created");
        Ok(Some(session.user))
    }

    async fn open_session(&self, account: &Account, now: DateTime<Utc>) -> Result<AuthSession, AppError> {
        let access_token = self.tokens.generate_access_token(account, now)?;
        let refresh_token = self.issue_refresh_token(account.id, now).await?;

        Ok(AuthSession {
            user: account.public(),
            access_token,
            refresh_token,
        })
    }

    async fn issue_refresh_token(&self, user_id: i64, now: DateTime<Utc>) -> Result<String, AppError> {
        let issued = self.tokens.generate_refresh_token(user_id, now)?;
        self.store
            .insert_refresh_token(NewRefreshToken {
                user_id,
                token_hash: hash_token(&issued.token),
                expires_at: issued.expires_at,
                created_at: now,
            })
            .await?;
        Ok(issued.token)
    }

    // bcrypt is CPU-bound; keep it off the async workers.
    async fn hash(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.password_hash_cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AppError> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
    }
}
