//! Input validators for account fields
//! 1. DoS protection: input length limits
//! 2. Email syntax check (RFC 5322 simplified)
//! 3. Display names free of control characters

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MIN_NAME_LENGTH: usize = 2;
const MAX_NAME_LENGTH: usize = 256;

lazy_static! {
    // Local part, '@', then dot-separated labels with a final label of two or more letters
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$"
    ).unwrap();
}

/// Validate an email address as given. The address is not trimmed or
/// lowercased: stored emails are compared exactly.
pub fn is_valid_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail);
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }

    let local_part = email.split('@').next().unwrap_or_default();
    if local_part.len() > MAX_LOCAL_PART_LENGTH
        || local_part.starts_with('.')
        || local_part.ends_with('.')
        || local_part.contains("..")
    {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

/// Validate a display name and return it trimmed
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }

    let length = trimmed.chars().count();
    if length < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort("name", MIN_NAME_LENGTH));
    }

    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name", MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("name"));
    }

    Ok(trimmed.to_string())
}
