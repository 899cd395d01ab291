//! Deep traversal for `deep` watchers.
//!
//! Reading every nested property while a watcher is the active target
//! subscribes it to the whole subtree.

use std::collections::HashSet;
use std::rc::Rc;

use super::value::Value;

/// Touch every reactive property reachable from `value`.
///
/// Frozen objects are skipped. Each container is visited once, so cyclic
/// graphs terminate.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(object) => {
            if object.is_frozen() || !seen.insert(Rc::as_ptr(&object.0) as usize) {
                return;
            }
            for key in object.keys() {
                if let Some(child) = object.get(&key) {
                    walk(&child, seen);
                }
            }
        }
        Value::Array(array) => {
            if !seen.insert(Rc::as_ptr(&array.0) as usize) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
