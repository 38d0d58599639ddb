//! Password hashing, verification and strength policy.

use bcrypt::{hash, verify};
use std::fmt;

use crate::error::{AppError, ValidationError};

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only looks at the first 72 bytes; longer inputs are refused outright
pub const MAX_PASSWORD_LENGTH: usize = 72;
pub const SPECIAL_CHARACTERS: &str = "@$!%*?&";

/// Why a password was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordViolation {
    TooShort { min: usize },
    TooLong { max: usize },
    Composition,
}

impl fmt::Display for PasswordViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordViolation::TooShort { min } => {
                write!(f, "Password must be at least {} characters long", min)
            }
            PasswordViolation::TooLong { max } => {
                write!(f, "Password must be at most {} characters long", max)
            }
            PasswordViolation::Composition => write!(
                f,
                "Password must contain uppercase and lowercase letters, digits and one of {}, and nothing else",
                SPECIAL_CHARACTERS
            ),
        }
    }
}

/// Check password strength
///
/// Requirements:
/// - 8 to 72 characters (bytes, since only ASCII is allowed)
/// - only ASCII letters, digits and `@$!%*?&`
/// - at least one lowercase letter, one uppercase letter, one digit and one of `@$!%*?&`
pub fn validate_password_strength(password: &str) -> Result<(), PasswordViolation> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordViolation::TooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordViolation::TooLong {
            max: MAX_PASSWORD_LENGTH,
        });
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    let allowed_only = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || SPECIAL_CHARACTERS.contains(c));

    if !(allowed_only && has_lowercase && has_uppercase && has_digit && has_special) {
        return Err(PasswordViolation::Composition);
    }

    Ok(())
}

/// Same as [`validate_password_strength`], as an application error
pub fn ensure_strong_password(password: &str) -> Result<(), AppError> {
    validate_password_strength(password)
        .map_err(|violation| AppError::Validation(ValidationError::WeakPassword(violation)))
}

/// Hash a password with bcrypt at the given cost
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}
