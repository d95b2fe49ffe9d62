//! Small helpers for reading loosely-shaped vendor JSON.

use serde_json::Value;

/// Follows object keys and returns the string at the end of the path.
pub fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(value, path)?.as_str()
}

pub fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |cur, key| cur.get(*key))
}

/// `<path>[0].text`, the vendor's content-block convention.
pub fn first_block_text<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(value, path)?.as_array()?.first()?.get("text")?.as_str()
}

/// Reads the first present key as an unsigned integer.
pub fn u64_any(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_u64))
}

pub fn str_any<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}
