//! Dotted-path access into JSON documents.
//!
//! Paths look like `items.0.spec.dataSource`: numeric segments index arrays,
//! every other segment is an object key.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

fn split(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::Template(format!("invalid JSON path {path:?}")));
    }
    Ok(segments)
}

fn step_mut<'a>(node: &'a mut Value, segment: &str, path: &str) -> Result<&'a mut Value> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Array(items) => {
            let index: usize = segment.parse().map_err(|_| {
                Error::Template(format!("{path:?}: {segment:?} is not an array index"))
            })?;
            let len = items.len();
            items.get_mut(index).ok_or_else(|| {
                Error::Template(format!("{path:?}: index {index} out of bounds (len {len})"))
            })
        }
        Value::Object(map) => Ok(map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))),
        other => Err(Error::Template(format!(
            "{path:?}: cannot descend into {segment:?} of a {} value",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk to `path`, creating missing intermediate objects, and return the
/// node found there; a null node becomes an empty object
pub fn entry_mut<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Value> {
    let mut node = root;
    for segment in split(path)? {
        node = step_mut(node, segment, path)?;
    }
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    Ok(node)
}

/// Set `path` to `value`, creating missing intermediate objects
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = split(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(Error::Template(format!("invalid JSON path {path:?}")));
    };
    let mut node = root;
    for segment in parents {
        node = step_mut(node, segment, path)?;
    }
    let slot = step_mut(node, last, path)?;
    *slot = value;
    Ok(())
}

/// Remove the field at `path`; returns whether anything was removed
pub fn remove(root: &mut Value, path: &str) -> Result<bool> {
    let segments = split(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Ok(false);
    };
    let mut node = root;
    for segment in parents {
        node = match node {
            Value::Object(map) => match map.get_mut(*segment) {
                Some(next) => next,
                None => return Ok(false),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(next) => next,
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
    }
    Ok(match node {
        Value::Object(map) => map.remove(*last).is_some(),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items.remove(i);
                true
            }
            _ => false,
        },
        _ => false,
    })
}

/// Read the value at `path`
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
