//! # Form Validation
//!
//! Field-level validation rules shared by the HTTP API and the API client.
//!
//! A [`Validator`] walks the fields of one form, normalizing each value
//! (trimming, lowercasing emails, turning blank optional strings into
//! `None`) and collecting every failure instead of stopping at the first.
//! [`Validator::finish`] turns the collected failures into a
//! [`ValidationErrors`] map keyed by field name.

use crate::primitives::{MAX_PASSWORD_LENGTH, MAX_YEAR, MIN_PASSWORD_LENGTH, MIN_YEAR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

// =============================================================================
// ERRORS
// =============================================================================

/// Validation failures grouped by field, in field-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// Create an empty error set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`, if any.
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Names of every field with at least one failure.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// RULES
// =============================================================================

/// Check that `value` looks like a deliverable email address.
///
/// Accepts `local@domain.tld` with no whitespace, exactly one `@`, and a
/// domain made of non-empty dot-separated labels (at least two).
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

/// Check that `value` is an `http(s)://host...` URL or an absolute site path.
pub fn is_valid_url(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    if let Some(path) = value.strip_prefix('/') {
        // "//host" is protocol-relative, not a site path
        return !path.starts_with('/');
    }
    // the parser is lenient about "http:host" and "http:///host"
    let has_authority = value
        .split_once("://")
        .is_some_and(|(_, rest)| !rest.starts_with(['/', '\\']));
    if !has_authority {
        return false;
    }
    match Url::parse(value) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Collects normalized field values and their failures for one form.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_length(&mut self, field: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len > max {
            self.errors
                .add(field, format!("must be at most {max} characters (got {len})"));
        }
    }

    /// Required text: trimmed, non-blank, at most `max` characters.
    pub fn required(&mut self, field: &str, value: &str, max: usize) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.errors.add(field, "is required");
        } else {
            self.check_length(field, trimmed, max);
        }
        trimmed.to_string()
    }

    /// Optional text: trimmed; blank becomes `None`.
    pub fn optional(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let trimmed = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.check_length(field, trimmed, max);
        Some(trimmed.to_string())
    }

    /// Patch of an optional text column.
    ///
    /// `None` leaves the column untouched; `Some(None)` or a blank string
    /// clears it.
    pub fn optional_patch(
        &mut self,
        field: &str,
        value: Option<Option<&str>>,
        max: usize,
    ) -> Option<Option<String>> {
        value.map(|inner| self.optional(field, inner, max))
    }

    /// Required email, lowercased.
    pub fn email(&mut self, field: &str, value: &str, max: usize) -> String {
        let normalized = self.required(field, value, max).to_lowercase();
        if !normalized.is_empty() && !is_valid_email(&normalized) {
            self.errors.add(field, "must be a valid email address");
        }
        normalized
    }

    /// Required URL or absolute path.
    pub fn url(&mut self, field: &str, value: &str, max: usize) -> String {
        let normalized = self.required(field, value, max);
        if !normalized.is_empty() && !is_valid_url(&normalized) {
            self.errors
                .add(field, "must be an http(s) URL or an absolute path");
        }
        normalized
    }

    /// Optional URL or absolute path; blank becomes `None`.
    pub fn optional_url(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let normalized = self.optional(field, value, max)?;
        if !is_valid_url(&normalized) {
            self.errors
                .add(field, "must be an http(s) URL or an absolute path");
        }
        Some(normalized)
    }

    /// Optional four-digit year.
    pub fn year(&mut self, field: &str, value: Option<i32>) -> Option<i32> {
        if let Some(year) = value
            && !(MIN_YEAR..=MAX_YEAR).contains(&year)
        {
            self.errors.add(
                field,
                format!("must be between {MIN_YEAR} and {MAX_YEAR}"),
            );
        }
        value
    }

    /// Password length check. The value is never trimmed or echoed back.
    pub fn password(&mut self, field: &str, value: &str) {
        let len = value.chars().count();
        if len < MIN_PASSWORD_LENGTH {
            self.errors.add(
                field,
                format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
            );
        } else if len > MAX_PASSWORD_LENGTH {
            self.errors.add(
                field,
                format!("must be at most {MAX_PASSWORD_LENGTH} characters"),
            );
        }
    }

    /// Record a failure that no built-in rule covers.
    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    /// Finish the form: `Ok(())` if no rule failed.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada@@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ada@.example.com"));
        assert!(!is_valid_email("ada @example.com"));
        assert!(!is_valid_email("ada@example..com"));
    }

    #[test]
    fn url_rules() {
        assert!(is_valid_url("https://cdn.example.com/a.jpg"));
        assert!(is_valid_url("http://localhost:8080/x"));
        assert!(is_valid_url("/static/img/portrait.webp"));
        assert!(!is_valid_url("//evil.example.com/a.jpg"));
        assert!(!is_valid_url("ftp://example.com/a.jpg"));
        assert!(!is_valid_url("https:///path"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("img/relative.png"));
        assert!(!is_valid_url("http:example.com/a.jpg"));
    }

    #[test]
    fn url_rules_reject_malformed_authorities() {
        for value in [
            "http://[::1",
            "https://exa%mple.com/a.jpg",
            "http://@/",
            "https://a:b:c/x",
            "http://<script>/",
            "https://:443/a.jpg",
        ] {
            assert!(!is_valid_url(value), "{value} should be rejected");
        }
        assert!(is_valid_url("https://[::1]:8443/a.jpg"));
        assert!(is_valid_url("https://user@example.com/a.jpg"));
    }

    #[test]
    fn validator_collects_every_failure() {
        let mut v = Validator::new();
        let title = v.required("title", "   ", 10);
        let email = v.email("email", "not-an-email", 255);
        v.year("year", Some(42));
        assert!(title.is_empty());
        assert_eq!(email, "not-an-email");

        let errors = v.finish().expect_err("three fields fail");
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["email", "title", "year"]);
        assert_eq!(errors.field("title"), Some(&["is required".to_string()][..]));
    }

    #[test]
    fn validator_normalizes_values() {
        let mut v = Validator::new();
        assert_eq!(v.email("email", "  Ada@Example.COM ", 255), "ada@example.com");
        assert_eq!(v.optional("name", Some("   "), 255), None);
        assert_eq!(v.optional("name", Some(" Ada "), 255), Some("Ada".to_string()));
        assert_eq!(v.optional_patch("caption", None, 10), None);
        assert_eq!(v.optional_patch("caption", Some(None), 10), Some(None));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let mut v = Validator::new();
        v.required("title", "ééééé", 5);
        assert!(v.finish().is_ok());

        let mut v = Validator::new();
        v.required("title", "ééééée", 5);
        assert!(v.finish().is_err());
    }

    #[test]
    fn password_bounds() {
        let mut v = Validator::new();
        v.password("password", "short");
        assert!(v.finish().is_err());

        let mut v = Validator::new();
        v.password("password", "long enough");
        assert!(v.finish().is_ok());
    }

    #[test]
    fn display_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("b", "second");
        errors.add("a", "first");
        assert_eq!(errors.to_string(), "a: first; b: second");
    }
}
