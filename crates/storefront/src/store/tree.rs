//! JSON tree operations with realtime-database semantics.
//!
//! - `null` is absence: writing `null` deletes, and parents left empty by a
//!   delete are removed too.
//! - Arrays are objects with index keys. When a write descends into an
//!   array it is converted to an object first (`null` holes dropped).

use serde_json::{Map, Value};

use super::StorePath;

/// Value at `path`, `Null` when absent.
#[must_use]
pub fn get(root: &Value, path: &StorePath) -> Value {
    let mut node = root;
    for segment in path.segments() {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Replace the value at `path`. `Null` deletes it and prunes empty parents.
pub fn set(root: &mut Value, path: &StorePath, value: Value) {
    set_segments(root, path.segments(), value);
}

/// Apply a multi-location update: each key of `children` is a path relative
/// to `path`.
pub fn merge(root: &mut Value, path: &StorePath, children: Map<String, Value>) {
    for (relative, value) in children {
        let target = path.clone().join(&StorePath::parse(&relative));
        set(root, &target, value);
    }
}

fn set_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if value.is_null() && !is_container(node) {
        return;
    }

    let map = as_object(node);
    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_segments(child, rest, value);
        if child.is_null() || is_empty_container(child) {
            map.remove(head);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
    }
}

const fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.iter().all(Value::is_null),
        _ => false,
    }
}

/// Turn `node` into an object in place and return it.
fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        let converted = match node.take() {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => Map::new(),
        };
        *node = Value::Object(converted);
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}
