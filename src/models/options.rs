//! Untyped, format-agnostic option maps.

use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named options passed to an importer or exporter without knowing its type.
///
/// Values are JSON values: `columns` is an array of strings or `null`,
/// `multiple_frames` a boolean, and so on.
pub type OptionMap = BTreeMap<String, Value>;

/// Parses a `key=value` assignment as given on the command line.
///
/// The value is parsed as JSON first (`true`, `3`, `["Position.X", null]`);
/// anything that is not valid JSON is taken as a plain string.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if there is no `=` or the key is empty.
pub fn parse_option_assignment(assignment: &str) -> Result<(String, Value)> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| Error::InvalidInput(format!("expected key=value, got '{assignment}'")))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidInput(format!(
            "missing option name in '{assignment}'"
        )));
    }
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
