use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Missing, empty, or whitespace only.
pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Every field as given, or `message` if any of them is blank. Values are
/// not trimmed here; passwords must keep their whitespace.
pub(crate) fn require_all<const N: usize>(
    fields: [Option<&str>; N],
    message: &str,
) -> Result<[String; N], ApiError> {
    if fields.iter().any(|f| is_blank(*f)) {
        return Err(ApiError::bad_request(message));
    }
    Ok(fields.map(|f| f.unwrap_or_default().to_string()))
}

/// Usernames and emails are stored trimmed and lowercase.
pub(crate) fn normalize_handle(value: &str) -> String {
    value.trim().to_lowercase()
}

pub(crate) fn normalized_email(value: &str) -> Result<String, ApiError> {
    let email = normalize_handle(value);
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(email)
}
