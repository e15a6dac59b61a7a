//! Depth-first search over untyped JSON
//!
//! Platform payloads bury the interesting node at varying depths. These
//! helpers walk a [`serde_json::Value`] pre-order (object members in map order,
//! then array elements by index) and return the first or all matches.

use serde_json::Value;

/// First node (pre-order) for which `predicate` holds
pub fn find_first<'a, F>(root: &'a Value, predicate: F) -> Option<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if predicate(node) {
            return Some(node);
        }
        push_children(node, &mut stack);
    }
    None
}

/// Every node for which `predicate` holds, in pre-order
pub fn find_all<'a, F>(root: &'a Value, predicate: F) -> Vec<&'a Value>
where
    F: Fn(&Value) -> bool,
{
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if predicate(node) {
            found.push(node);
        }
        push_children(node, &mut stack);
    }
    found
}

/// Value stored under the first occurrence of `key` in any object
pub fn find_key<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    find_first(root, |node| {
        node.as_object().is_some_and(|map| map.contains_key(key))
    })
    .and_then(|node| node.get(key))
}

/// First object that has every one of `keys`
pub fn find_object_with<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    find_first(root, |node| {
        node.as_object()
            .is_some_and(|map| keys.iter().all(|k| map.contains_key(*k)))
    })
}

// Children are pushed in reverse so the stack pops them in document order.
fn push_children<'a>(node: &'a Value, stack: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => stack.extend(map.values().rev()),
        Value::Array(items) => stack.extend(items.iter().rev()),
        _ => {}
    }
}
