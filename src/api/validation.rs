//! Input validation for API requests.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    /// Storage keys: letters, digits, dot, dash and underscore, 1-64 chars
    static ref STORAGE_KEY_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap();

    /// Positive decimal integer without sign or leading zeros
    static ref ID_REGEX: Regex = Regex::new(r"^[1-9][0-9]{0,17}$").unwrap();
}

/// Trimmed value of an optional text field; blank counts as missing
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a path id
pub fn parse_id(raw: &str) -> Result<i64, String> {
    if !ID_REGEX.is_match(raw) {
        return Err(format!("Invalid id: {}", raw));
    }
    raw.parse::<i64>().map_err(|_| format!("Invalid id: {}", raw))
}

/// Validate a user storage key
pub fn validate_storage_key(key: &str) -> Result<(), String> {
    if STORAGE_KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        Err("Storage key must be 1-64 characters of letters, digits, '.', '-' or '_'".to_string())
    }
}

/// Role reference in an invite: a number or a numeric string. Anything else
/// means no role.
pub fn role_id_from_json(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().filter(|id| *id > 0),
        Value::String(s) => parse_id(s.trim()).ok(),
        _ => None,
    }
}
