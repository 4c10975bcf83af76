//! API handlers and the request/response types they share.
//!
//! Usernames are validated here, at the HTTP boundary, before they reach the
//! binding registry. Handlers return [`LatchError`](crate::latch::LatchError)
//! and rely on [`error`] to turn it into a response.

pub mod access;
pub mod auth;
pub mod error;
pub mod health;
pub mod login;
pub mod types;
pub mod users;

use crate::latch::LatchError;
use regex::Regex;

/// Same shape the primary backend accepts for names.
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^\w(([\w.-]+)?\w)?$").is_ok_and(|re| re.is_match(username))
}

/// A required field, returned as given. Blank values are rejected.
pub(crate) fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, LatchError> {
    if value.trim().is_empty() {
        Err(LatchError::InvalidRequest(format!("{field} is required")))
    } else {
        Ok(value)
    }
}

pub(crate) fn checked_username(username: &str) -> Result<&str, LatchError> {
    if valid_username(username) {
        Ok(username)
    } else {
        Err(LatchError::InvalidRequest(format!(
            "invalid username: {username:?}"
        )))
    }
}
