//! Helpers over `serde_json::Value` trees.
//!
//! Parameter trees, override patches and CLI argument trees are all plain JSON
//! values. These helpers provide the recursive merge used by config resolution,
//! dotted-path access used by flows, and the inline JSON expansion used for
//! `$`-suffixed CLI parameters.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Suffix marking a key whose string value holds serialized JSON.
pub const INLINE_JSON_MARKER: char = '$';

/// Errors that can occur while expanding inline JSON parameters.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The value of an inline JSON key failed to parse.
    #[error("Invalid inline JSON for parameter {key}: {source}")]
    InlineJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The value of an inline JSON key was not a string.
    #[error("Inline JSON parameter {key} must be a string")]
    InlineJsonNotString { key: String },
}

/// Deep-merges `patch` into `target`.
///
/// Objects merge key by key, recursively. Any other patch value (scalar or
/// array) replaces the target value wholesale.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Returns the value at a dotted path like `"a.b.c"`.
///
/// An empty path returns the value itself. Returns `None` when any segment
/// is missing or a non-object is reached before the path ends.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Sets the value at a dotted path, creating intermediate objects.
///
/// Intermediate non-object values are replaced by objects.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(value, &segments, new_value);
}

fn set_segments(value: &mut Value, segments: &[&str], new_value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *value = new_value;
        return;
    };
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    if let Value::Object(map) = value {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_segments(child, rest, new_value);
    }
}

/// Flattens nested objects into dotted keys.
///
/// Arrays and scalars are leaves. Empty objects produce no entries.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    fn recurse(value: &Value, prefix: &str, out: &mut BTreeMap<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let next = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    recurse(child, &next, out);
                }
            }
            leaf => {
                out.insert(prefix.to_string(), leaf.clone());
            }
        }
    }

    let mut out = BTreeMap::new();
    recurse(value, "", &mut out);
    out
}

/// Expands `$`-suffixed keys holding serialized JSON, at every depth.
///
/// For each key `k$` the string value is parsed as JSON and deep-merged over
/// the sibling key `k` (created if absent); the `k$` key is removed. Nested
/// objects are expanded first, so inline JSON always wins over structured
/// values at the same level.
pub fn expand_inline_json(value: &mut Value) -> Result<(), Error> {
    let Value::Object(map) = value else {
        return Ok(());
    };

    for child in map.values_mut() {
        expand_inline_json(child)?;
    }

    let inline_keys: Vec<String> = map
        .keys()
        .filter(|k| k.ends_with(INLINE_JSON_MARKER))
        .cloned()
        .collect();

    for inline_key in inline_keys {
        let Some(raw) = map.remove(&inline_key) else {
            continue;
        };
        let text = match raw {
            Value::String(text) => text,
            _ => return Err(Error::InlineJsonNotString { key: inline_key }),
        };
        let parsed: Value = serde_json::from_str(&text).map_err(|e| Error::InlineJson {
            key: inline_key.clone(),
            source: e,
        })?;

        let base_key = inline_key.trim_end_matches(INLINE_JSON_MARKER).to_string();
        match map.get_mut(&base_key) {
            Some(existing) => deep_merge(existing, &parsed),
            None => {
                map.insert(base_key, parsed);
            }
        }
    }
    Ok(())
}
