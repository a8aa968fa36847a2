//! Forgiving field deserializers for model-produced JSON.
//!
//! Models drift from the requested shape: a list comes back as a single
//! string, a number replaces a string, placeholder text like "not mentioned"
//! stands in for absence. These helpers absorb that drift so the typed summary
//! never carries placeholders or fails on a cosmetic mismatch.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Values the prompt template or the model use to mean "absent".
const PLACEHOLDERS: [&str; 11] = [
    "not mentioned",
    "not stated",
    "not specified",
    "not provided",
    "not available",
    "not discussed",
    "not recorded",
    "value if mentioned",
    "n/a",
    "null",
    "-",
];

/// A sub-record that can also be built from a bare list of items.
pub trait LooseRecord: Default + DeserializeOwned {
    /// Build the record when the model emitted a list or a string instead of an object.
    fn from_items(items: Vec<String>) -> Self;
}

/// True if the text only says that nothing was reported.
#[must_use]
pub fn is_placeholder(text: &str) -> bool {
    let normalized = text.trim().trim_end_matches('.').trim().to_lowercase();
    normalized.is_empty() || PLACEHOLDERS.contains(&normalized.as_str())
}

/// Clean a single value; placeholders become `None`.
#[must_use]
pub fn clean(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!is_placeholder(trimmed)).then(|| trimmed.to_string())
}

/// Flatten any JSON value into display text.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => clean(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| value_to_text(v).map(|text| format!("{k}: {text}")))
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
    }
}

fn value_to_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| value_to_text(v).map(|text| format!("{k}: {text}")))
            .collect(),
        other => value_to_text(other).into_iter().collect(),
    }
}

/// Deserialize any scalar-ish value as text.
///
/// # Errors
/// Only fails if the input is not valid JSON.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_text(&value).unwrap_or_default())
}

/// Deserialize a list, accepting a single value as a one-element list.
///
/// # Errors
/// Only fails if the input is not valid JSON.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_items(&value))
}

/// Deserialize a name-to-text mapping, dropping placeholder entries.
///
/// # Errors
/// Only fails if the input is not valid JSON.
pub fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    match value {
        Value::Object(map) => {
            for (key, item) in &map {
                if let Some(text) = value_to_text(item) {
                    out.insert(key.clone(), text);
                }
            }
        }
        other => {
            if let Some(text) = value_to_text(&other) {
                out.insert("notes".to_string(), text);
            }
        }
    }
    Ok(out)
}

/// Deserialize a sub-record, falling back to [`LooseRecord::from_items`].
///
/// # Errors
/// Fails if an object is present but its fields cannot be read.
pub fn record<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: LooseRecord,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        other => Ok(T::from_items(value_to_items(&other))),
    }
}
