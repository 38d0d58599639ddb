//! Postgres-backed store tests
//!
//! Each test creates its own database from `configuration.yaml` (overridable
//! with `APP_DATABASE__*`) and runs the migrations. They need a running
//! Postgres, so they are ignored by default:
//!
//! ```text
//! cargo test --test pg_store -- --ignored
//! ```

use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;

use fleet_auth::auth::{
    hash_token, AuthService, NewAccount, NewRefreshToken, Role, MAX_FAILED_LOGIN_ATTEMPTS,
};
use fleet_auth::configuration::{get_configuration, AuthSettings, DatabaseSettings, JwtSettings};
use fleet_auth::error::{AppError, AuthError, DatabaseError};
use fleet_auth::store::{AuthStore, PgStore};

const PASSWORD: &str = "Str0ng!Pass";

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn spawn_store() -> PgStore {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    PgStore::new(configure_database(&configuration.database).await)
}

fn service(store: &PgStore) -> AuthService {
    let jwt = JwtSettings {
        access_token_secret: "pg-access-secret".to_string(),
        refresh_token_secret: "pg-refresh-secret".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "fleet_auth".to_string(),
    };
    let settings = AuthSettings {
        password_hash_cost: 4,
        rotate_refresh_tokens: false,
    };
    AuthService::new(Arc::new(store.clone()), &jwt, &settings)
}

fn new_account(email: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        password_hash: "$2b$04$placeholderplaceholderplaceholderplaceholderpla".to_string(),
        name: "Fleet Driver".to_string(),
        role: Role::User,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn duplicate_email_hits_unique_constraint() {
    let store = spawn_store().await;

    store.insert_account(new_account("dup@fleet.com")).await.unwrap();
    let result = store.insert_account(new_account("dup@fleet.com")).await;
    assert!(matches!(
        result,
        Err(DatabaseError::UniqueConstraintViolation(_))
    ));

    let result = service(&store)
        .register("dup@fleet.com", PASSWORD, "Second", Role::User)
        .await;
    assert!(matches!(result, Err(AppError::Auth(AuthError::EmailExists))));
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn failed_login_counter_locks_on_fifth_attempt() {
    let store = spawn_store().await;
    let account = store.insert_account(new_account("lock@fleet.com")).await.unwrap();
    let now = Utc::now();
    let lock_until = now + Duration::minutes(30);

    for expected in 1..MAX_FAILED_LOGIN_ATTEMPTS {
        let failed = store
            .record_failed_login(account.id, MAX_FAILED_LOGIN_ATTEMPTS, lock_until, now)
            .await
            .unwrap();
        assert_eq!(failed.attempts, expected);
        assert!(failed.locked_until.is_none());
    }

    let failed = store
        .record_failed_login(account.id, MAX_FAILED_LOGIN_ATTEMPTS, lock_until, now)
        .await
        .unwrap();
    assert_eq!(failed.attempts, MAX_FAILED_LOGIN_ATTEMPTS);
    let stored_lock = failed.locked_until.expect("lock should be set");
    assert!((stored_lock - lock_until).num_milliseconds().abs() < 1);

    store.record_successful_login(account.id, now).await.unwrap();
    let account = store.find_account_by_id(account.id).await.unwrap().unwrap();
    assert_eq!(account.failed_login_attempts, 0);
    assert!(account.locked_until.is_none());
    assert!(account.last_login_at.is_some());
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn lockout_sequence_through_the_service() {
    let store = spawn_store().await;
    let service = service(&store);
    service
        .register("victim@fleet.com", PASSWORD, "Victim", Role::User)
        .await
        .unwrap();

    for remaining in (0..MAX_FAILED_LOGIN_ATTEMPTS).rev() {
        match service.login("victim@fleet.com", "Wrong!Pass1").await {
            Err(AppError::Auth(AuthError::InvalidCredentials {
                attempts_remaining,
                locked_until,
            })) => {
                assert_eq!(attempts_remaining, Some(remaining as u32));
                assert_eq!(locked_until.is_some(), remaining == 0);
            }
            other => panic!("unexpected login result: {:?}", other.map(|s| s.user)),
        }
    }

    let result = service.login("victim@fleet.com", PASSWORD).await;
    assert!(matches!(
        result,
        Err(AppError::Auth(AuthError::AccountLocked { .. }))
    ));
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn refresh_tokens_expire_and_revoke() {
    let store = spawn_store().await;
    let account = store.insert_account(new_account("tokens@fleet.com")).await.unwrap();
    let now = Utc::now();

    for (token, expires_at) in [
        ("live-token", now + Duration::days(7)),
        ("expired-token", now - Duration::seconds(1)),
    ] {
        store
            .insert_refresh_token(NewRefreshToken {
                user_id: account.id,
                token_hash: hash_token(token),
                expires_at,
                created_at: now - Duration::days(1),
            })
            .await
            .unwrap();
    }

    assert!(store
        .find_refresh_token(&hash_token("expired-token"), now)
        .await
        .unwrap()
        .is_none());
    let live = store
        .find_refresh_token(&hash_token("live-token"), now)
        .await
        .unwrap()
        .expect("live token missing");
    assert!(live.revoked_at.is_none());
    assert_eq!(store.active_refresh_tokens(account.id, now).await.unwrap().len(), 1);

    assert!(store.revoke_refresh_token(&hash_token("live-token"), now).await.unwrap());
    assert!(!store.revoke_refresh_token(&hash_token("live-token"), now).await.unwrap());

    let revoked = store
        .find_refresh_token(&hash_token("live-token"), now)
        .await
        .unwrap()
        .expect("revoked rows are still returned");
    assert!(revoked.revoked_at.is_some());
    assert!(store.active_refresh_tokens(account.id, now).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn password_change_revokes_every_token() {
    let store = spawn_store().await;
    let service = service(&store);
    let first = service
        .register("change@fleet.com", PASSWORD, "Change", Role::User)
        .await
        .unwrap();
    service.login("change@fleet.com", PASSWORD).await.unwrap();

    service
        .change_password(first.user.id, PASSWORD, "N3w!Password")
        .await
        .unwrap();

    assert!(service.active_sessions(first.user.id).await.unwrap().is_empty());
    let result = service.refresh_access_token(&first.refresh_token).await;
    assert!(matches!(result, Err(AppError::Auth(AuthError::TokenRevoked))));
}
