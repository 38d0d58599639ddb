//! Application error handling
//!
//! Every fallible operation in the crate returns `Result<_, AppError>`.
//! The error carries a stable machine-readable code (`AppError::code`) and is
//! rendered as the tagged failure envelope
//! `{"success": false, "error": ..., "code": ..., ...extra}`.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::{PasswordViolation, Role};

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidEmail,
    WeakPassword(PasswordViolation),
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    SuspiciousContent(&'static str),
    /// Request body could not be parsed (malformed JSON, missing field, unknown role)
    InvalidRequest(String),
}

impl ValidationError {
    /// Field the error refers to, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidEmail => Some("email"),
            ValidationError::WeakPassword(_) => Some("password"),
            ValidationError::EmptyField(field)
            | ValidationError::TooShort(field, _)
            | ValidationError::TooLong(field, _)
            | ValidationError::SuspiciousContent(field) => Some(field),
            ValidationError::InvalidRequest(_) => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail => write!(f, "Invalid email address format"),
            ValidationError::WeakPassword(violation) => write!(f, "{}", violation),
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Unique violations are detected by SQLSTATE rather than message text.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                DatabaseError::UniqueConstraintViolation(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::UnexpectedError(err.to_string())
            }
            _ => DatabaseError::QueryExecution(err.to_string()),
        }
    }
}

/// Configuration errors. Any of these at startup is fatal.
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
///
/// Credential failures deliberately share one generic message so callers
/// cannot tell an unknown email from a wrong password.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    InvalidCredentials {
        attempts_remaining: Option<u32>,
        locked_until: Option<DateTime<Utc>>,
    },
    AccountDisabled,
    AccountLocked {
        locked_until: DateTime<Utc>,
    },
    EmailExists,
    InvalidRefreshToken,
    TokenNotFound,
    TokenRevoked,
    UserNotFound,
    InvalidCurrentPassword,
    MissingToken,
    MissingRefreshToken,
    TokenExpired,
    TokenInvalid,
    NotAuthenticated,
    InsufficientPermissions {
        required_roles: Vec<Role>,
        user_role: Role,
    },
}

impl AuthError {
    /// Credential failure without lockout details (unknown email)
    pub fn invalid_credentials() -> Self {
        AuthError::InvalidCredentials {
            attempts_remaining: None,
            locked_until: None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            AuthError::EmailExists => "EMAIL_EXISTS",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::TokenNotFound => "TOKEN_NOT_FOUND",
            AuthError::TokenRevoked => "TOKEN_REVOKED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::InvalidCurrentPassword => "INVALID_CURRENT_PASSWORD",
            AuthError::MissingToken => "NO_TOKEN",
            AuthError::MissingRefreshToken => "NO_REFRESH_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid => "INVALID_TOKEN",
            AuthError::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthError::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::AccountLocked { .. } => StatusCode::LOCKED,
            AuthError::AccountDisabled | AuthError::InsufficientPermissions { .. } => {
                StatusCode::FORBIDDEN
            }
            AuthError::EmailExists => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials { .. } => write!(f, "Invalid credentials"),
            AuthError::AccountDisabled => write!(f, "Account is disabled"),
            AuthError::AccountLocked { .. } => write!(
                f,
                "Account temporarily locked after repeated failed login attempts"
            ),
            AuthError::EmailExists => write!(f, "Email is already registered"),
            AuthError::InvalidRefreshToken => write!(f, "Invalid refresh token"),
            AuthError::TokenNotFound => write!(f, "Refresh token not found or expired"),
            AuthError::TokenRevoked => write!(f, "Refresh token has been revoked"),
            AuthError::UserNotFound => write!(f, "User not found or inactive"),
            AuthError::InvalidCurrentPassword => write!(f, "Current password is incorrect"),
            AuthError::MissingToken => write!(f, "No authentication token provided"),
            AuthError::MissingRefreshToken => write!(f, "No refresh token provided"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::InsufficientPermissions { .. } => {
                write!(f, "Insufficient permissions for this action")
            }
        }
    }
}

impl StdError for AuthError {}

// ============================================================================
// 2. UNIFIED APPLICATION ERROR TYPE
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(ValidationError::InvalidEmail) => "INVALID_EMAIL",
            AppError::Validation(ValidationError::WeakPassword(_)) => "WEAK_PASSWORD",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => "DUPLICATE_ENTRY",
            AppError::Database(DatabaseError::NotFound(_)) => "NOT_FOUND",
            AppError::Database(DatabaseError::ConnectionPool(_)) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::Auth(e) => e.code(),
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The auth error carried by this value, if any
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            AppError::Auth(e) => Some(e),
            _ => None,
        }
    }

    /// Message safe to show to the caller. Internals never leak here.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                "Duplicate entry".to_string()
            }
            AppError::Database(DatabaseError::NotFound(_)) => "Record not found".to_string(),
            AppError::Database(DatabaseError::ConnectionPool(_)) => {
                "Database service temporarily unavailable".to_string()
            }
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
        }
    }

    /// Extra fields merged into the failure envelope
    pub fn extra_fields(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        match self {
            AppError::Auth(AuthError::InvalidCredentials {
                attempts_remaining,
                locked_until,
            }) => {
                if let Some(remaining) = attempts_remaining {
                    extra.insert("attemptsRemaining".to_string(), Value::from(*remaining));
                }
                if let Some(until) = locked_until {
                    extra.insert("lockedUntil".to_string(), Value::from(rfc3339(until)));
                }
            }
            AppError::Auth(AuthError::AccountLocked { locked_until }) => {
                extra.insert("lockedUntil".to_string(), Value::from(rfc3339(locked_until)));
            }
            AppError::Auth(AuthError::InsufficientPermissions {
                required_roles,
                user_role,
            }) => {
                let required: Vec<Value> = required_roles
                    .iter()
                    .map(|role| Value::from(role.as_str()))
                    .collect();
                extra.insert("requiredRoles".to_string(), Value::Array(required));
                extra.insert("userRole".to_string(), Value::from(user_role.as_str()));
            }
            AppError::Validation(e) => {
                if let Some(field) = e.field() {
                    extra.insert("field".to_string(), Value::from(field));
                }
            }
            _ => {}
        }
        extra
    }
}

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Failure envelope rendered for every error
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorResponse {
    pub fn from_error(error: &AppError, request_id: &str) -> Self {
        Self {
            success: false,
            error: error.public_message(),
            code: error.code().to_string(),
            request_id: request_id.to_string(),
            extra: error.extra_fields(),
        }
    }
}

impl AppError {
    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(
                    request_id = request_id,
                    code = e.code(),
                    error = %e,
                    "Authentication error"
                );
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(e) => e.status_code(),
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        HttpResponse::build(self.status_code()).json(ErrorResponse::from_error(self, &request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email");
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_codes_for_input_errors() {
        assert_eq!(AppError::from(ValidationError::InvalidEmail).code(), "INVALID_EMAIL");
        assert_eq!(
            AppError::from(ValidationError::WeakPassword(PasswordViolation::Composition)).code(),
            "WEAK_PASSWORD"
        );
        assert_eq!(
            AppError::from(ValidationError::TooShort("name", 2)).code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_status_mapping() {
        let locked = AppError::from(AuthError::AccountLocked {
            locked_until: Utc::now(),
        });
        assert_eq!(locked.status_code(), StatusCode::LOCKED);
        assert_eq!(
            AppError::from(AuthError::invalid_credentials()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::AccountDisabled).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::from(AuthError::EmailExists).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(AuthError::UserNotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(ValidationError::InvalidEmail).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_permissions_envelope() {
        let err = AppError::from(AuthError::InsufficientPermissions {
            required_roles: vec![Role::Admin],
            user_role: Role::Viewer,
        });
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let body = serde_json::to_value(ErrorResponse::from_error(&err, "req-2")).unwrap();
        assert_eq!(body["code"], "INSUFFICIENT_PERMISSIONS");
        assert_eq!(body["requiredRoles"], serde_json::json!(["admin"]));
        assert_eq!(body["userRole"], "viewer");
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::Database(DatabaseError::QueryExecution(
            "relation \"users\" does not exist".to_string(),
        ));
        let body = ErrorResponse::from_error(&err, "req-1");

        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "Internal server error");
    }

    #[test]
    fn test_envelope_carries_lockout_fields() {
        let until = Utc.with_ymd_and_hms(2030, 1, 1, 12, 30, 0).unwrap();
        let err = AppError::from(AuthError::InvalidCredentials {
            attempts_remaining: Some(0),
            locked_until: Some(until),
        });

        let body = serde_json::to_value(ErrorResponse::from_error(&err, "req-2")).unwrap();

        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["attemptsRemaining"], 0);
        assert_eq!(body["lockedUntil"], "2030-01-01T12:30:00.000Z");
    }

    #[test]
    fn test_unknown_email_has_no_attempt_counter() {
        let err = AppError::from(AuthError::invalid_credentials());
        assert!(err.extra_fields().is_empty());
    }

    #[test]
    fn test_validation_envelope_names_field() {
        let err = AppError::from(ValidationError::TooLong("name", 256));
        assert_eq!(err.extra_fields()["field"], "name");
    }
}
