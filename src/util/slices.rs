//! Slice and value coercion helpers.

use serde_json::Value;

/// Items of `a` that also appear in `b`, in `a`'s order, without duplicates
pub fn intersect<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in a {
        if b.contains(item) && !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Items of `a` missing from `b`, in `a`'s order
pub fn difference<T: PartialEq + Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().filter(|item| !b.contains(item)).cloned().collect()
}

/// Whether any element equals `needle`
pub fn contains<S: AsRef<str>>(haystack: &[S], needle: &str) -> bool {
    haystack.iter().any(|s| s.as_ref() == needle)
}

/// Sort and remove duplicates
pub fn dedup_sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items
}

/// Display form of a JSON value: strings unquoted, everything else as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
