//! Structural checks for sign-up credentials.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::OnceLock};
use thiserror::Error;

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 32;

/// Email/password pair submitted at sign-up. Only lives for one request.
#[derive(Debug)]
pub struct Credential {
    pub email: String,
    pub password: SecretString,
}

impl Credential {
    #[must_use]
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: SecretString::from(password.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
}

impl Field {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: &'static str,
}

impl ValidationError {
    const fn new(field: Field, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s,]+@[^@\s,.]+(\.[^@\s,.]+)+$").ok())
        .as_ref()
}

pub fn valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

/// Validate a credential before any hashing or storage work happens.
///
/// # Errors
/// Returns the first failing field: a missing or malformed email, or a password
/// whose length (in characters) is outside `[8, 32]`.
pub fn validate(credential: &Credential) -> Result<(), ValidationError> {
    if credential.email.is_empty() {
        return Err(ValidationError::new(Field::Email, "required"));
    }

    if !valid_email(&credential.email) {
        return Err(ValidationError::new(Field::Email, "not a valid address"));
    }

    let password = credential.password.expose_secret();
    if password.is_empty() {
        return Err(ValidationError::new(Field::Password, "required"));
    }

    let length = password.chars().count();
    if !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&length) {
        return Err(ValidationError::new(
            Field::Password,
            "must be between 8 and 32 characters",
        ));
    }

    Ok(())
}
