//! Helpers for editing a JSON value as a tree of keyed nodes.

use serde_json::{Map, Value};

/// Write `data` at `segments` below `node`. `null` deletes, and objects left
/// empty are pruned, matching how the store itself reports values.
pub(crate) fn set_at<S: AsRef<str>>(node: &mut Value, segments: &[S], data: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = data;
        return;
    };
    let first = first.as_ref();

    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() && data.is_null() {
        map.remove(first);
    } else {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
    }
}

/// The value at `segments` below `node`, if any.
pub(crate) fn get_at<S: AsRef<str>>(node: Value, segments: &[S]) -> Option<Value> {
    let mut node = node;
    for segment in segments {
        let Value::Object(mut map) = node else {
            return None;
        };
        node = map.remove(segment.as_ref())?;
    }
    Some(node)
}
