//! Binding of name/value option maps onto typed option structs.
//!
//! Every importer and exporter keeps its options in a plain struct deriving
//! `Serialize` and `Deserialize`. Binding goes through the struct's JSON
//! form: its field names are the set of valid option names, and the typed
//! deserialize is the value check.
//!
//! Option structs must serialize every field (no `skip_serializing_if`),
//! otherwise a field left at `None` would look like an unknown name.

use crate::models::OptionMap;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Applies `options` to `target`, all or nothing.
///
/// Names are checked first, so a map with one unknown name changes nothing.
///
/// # Errors
///
/// Returns [`Error::UnknownOption`] naming the first unknown key (in key
/// order) and [`Error::InvalidOptionValue`] naming the first key whose value
/// does not fit the field.
pub fn bind<T>(target: &mut T, options: &OptionMap, target_name: &str) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    if options.is_empty() {
        return Ok(());
    }
    let fields = to_fields(target)?;

    if let Some(name) = options.keys().find(|name| !fields.contains_key(*name)) {
        return Err(Error::UnknownOption {
            target: target_name.to_string(),
            name: name.clone(),
        });
    }

    // Check each value alone first so the error names the offending option.
    for (name, value) in options {
        let mut probe = fields.clone();
        probe.insert(name.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(Value::Object(probe)) {
            return Err(Error::InvalidOptionValue {
                name: name.clone(),
                cause: e.to_string(),
            });
        }
    }

    let mut merged = fields;
    for (name, value) in options {
        merged.insert(name.clone(), value.clone());
    }
    *target = serde_json::from_value(Value::Object(merged)).map_err(|e| {
        Error::InvalidOptionValue {
            name: options.keys().cloned().collect::<Vec<_>>().join(", "),
            cause: e.to_string(),
        }
    })?;
    Ok(())
}

/// Builds an options struct from its defaults plus `options`.
///
/// # Errors
///
/// See [`bind`].
pub fn build<T>(options: &OptionMap, target_name: &str) -> Result<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut value = T::default();
    bind(&mut value, options, target_name)?;
    Ok(value)
}

/// Names of all options an options struct accepts.
#[must_use]
pub fn option_names<T>() -> Vec<String>
where
    T: Serialize + Default,
{
    to_fields(&T::default())
        .map(|fields| fields.keys().cloned().collect())
        .unwrap_or_default()
}

/// JSON object form of an options struct.
///
/// # Errors
///
/// Returns an error if the struct does not serialize to a JSON object.
pub fn to_value<T: Serialize>(options: &T) -> Result<Value> {
    to_fields(options).map(Value::Object)
}

fn to_fields<T: Serialize>(options: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(options) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(Error::operation(
            "bind_options",
            "options type does not serialize to an object",
        )),
        Err(e) => Err(Error::operation("bind_options", e)),
    }
}
