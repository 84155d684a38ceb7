//! YANG identifier validation and utilities
//!
//! This module provides validation for YANG identifiers, prefixed names
//! (`prefix:identifier`) and revision dates.

use crate::error::SchemaError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Identifiers longer than this are accepted with a warning
pub const IDENTIFIER_WARN_LENGTH: usize = 64;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap());

static REVISION_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Check if a string is a valid YANG identifier
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Check if a string is a valid, possibly prefixed, identifier
pub fn is_valid_prefixed(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_identifier(prefix) && is_valid_identifier(local),
        None => is_valid_identifier(name),
    }
}

/// Validate an identifier and return an error if invalid
///
/// Overlong identifiers only produce a warning.
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    if !is_valid_identifier(name) {
        return Err(SchemaError::syntax(format!("Invalid identifier: '{}'", name)));
    }
    if name.len() > IDENTIFIER_WARN_LENGTH {
        tracing::warn!(identifier = name, "identifier is longer than {} characters", IDENTIFIER_WARN_LENGTH);
    }
    Ok(())
}

/// Validate a possibly prefixed identifier
pub fn validate_prefixed(name: &str) -> Result<(), SchemaError> {
    match name.split_once(':') {
        Some((prefix, local)) => {
            validate_identifier(prefix)?;
            validate_identifier(local)
        }
        None => validate_identifier(name),
    }
}

/// Split a prefixed name into prefix and local name
pub fn split_prefixed(name: &str) -> (Option<&str>, &str) {
    if let Some((prefix, local)) = name.split_once(':') {
        (Some(prefix), local)
    } else {
        (None, name)
    }
}

/// Validate a `YYYY-MM-DD` revision date
pub fn validate_date(date: &str) -> Result<(), SchemaError> {
    if !REVISION_DATE.is_match(date) || NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return Err(SchemaError::syntax(format!("Invalid date: '{}'", date)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("interface"));
        assert!(is_valid_identifier("if-name"));
        assert!(is_valid_identifier("_hidden"));
        assert!(is_valid_identifier("a.b"));
        assert!(is_valid_identifier("x1"));

        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("-abc"));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("p:x"));
    }

    #[test]
    fn test_is_valid_prefixed() {
        assert!(is_valid_prefixed("if:interface"));
        assert!(is_valid_prefixed("interface"));
        assert!(!is_valid_prefixed(":x"));
        assert!(!is_valid_prefixed("x:"));
    }

    #[test]
    fn test_long_identifier_is_not_an_error() {
        let long = "a".repeat(100);
        assert!(validate_identifier(&long).is_ok());
    }

    #[test]
    fn test_split_prefixed() {
        assert_eq!(split_prefixed("leaf"), (None, "leaf"));
        assert_eq!(split_prefixed("if:leaf"), (Some("if"), "leaf"));
    }

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2024-02-29").is_ok());
        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("2023-1-01").is_err());
        assert!(validate_date("yesterday").is_err());
    }
}
