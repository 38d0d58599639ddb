//! Account and refresh-token records owned by the authentication core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Closed set; anything else is rejected at every boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A row of the credential store
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Login state of an account at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Unlocked,
    Locked { until: DateTime<Utc> },
    Disabled,
}

impl Account {
    /// Disabled wins over a lock; a lock whose time has passed no longer counts.
    pub fn state(&self, now: DateTime<Utc>) -> AccountState {
        if !self.is_active {
            return AccountState::Disabled;
        }
        match self.locked_until {
            Some(until) if now < until => AccountState::Locked { until },
            _ => AccountState::Unlocked,
        }
    }

    pub fn public(&self) -> PublicAccount {
        PublicAccount {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Account fields safe to return to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicAccount {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// A row of the token store. Only the SHA-256 digest of the signed token is kept.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful register or login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: PublicAccount,
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a refresh. `refresh_token` is only set when rotation is enabled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account() -> Account {
        Account {
            id: 1,
            email: "driver@fleet.test".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            name: "Driver".to_string(),
            role: Role::User,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_role_round_trips_through_text() {
        for role in [Role::Admin, Role::User, Role::Viewer] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
        assert!("Admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_rejects_unknown_json() {
        assert_eq!(serde_json::from_str::<Role>("\"viewer\"").unwrap(), Role::Viewer);
        assert!(serde_json::from_str::<Role>("\"root\"").is_err());
    }

    #[test]
    fn test_state_unlocked() {
        assert_eq!(account().state(Utc::now()), AccountState::Unlocked);
    }

    #[test]
    fn test_state_locked_until_time_passes() {
        let now = Utc::now();
        let until = now + Duration::minutes(30);
        let mut locked = account();
        locked.locked_until = Some(until);

        assert_eq!(locked.state(now), AccountState::Locked { until });
        assert_eq!(locked.state(until), AccountState::Unlocked);
    }

    #[test]
    fn test_disabled_overrides_lock() {
        let now = Utc::now();
        let mut disabled = account();
        disabled.is_active = false;
        disabled.locked_until = Some(now + Duration::minutes(5));

        assert_eq!(disabled.state(now), AccountState::Disabled);
    }

    #[test]
    fn test_refresh_token_usability() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord {
            id: 1,
            user_id: 1,
            token_hash: "abc".to_string(),
            expires_at: now + Duration::days(7),
            revoked_at: None,
            created_at: now,
        };
        assert!(record.is_usable(now));
        assert!(!record.is_usable(record.expires_at));

        record.revoked_at = Some(now);
        assert!(!record.is_usable(now));
    }
}
