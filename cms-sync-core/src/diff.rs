//! Attribute differ and per-kind comparable field declarations.
//!
//! Only declared fields take part in a comparison; identity and relation fields never do.
//! Patches only ever add or change attributes: a field the desired record leaves out is "not
//! specified" and is never removed from the live record.

use serde_json::Value;

use crate::contract::Record;

/// Folder attributes compared by value. `parent` is a relation and handled by the sequencer.
pub const FOLDER_FIELDS: &[&str] = &["name"];

/// Role attributes compared by value. The nested `permits` matrix is reconciled separately.
pub const ROLE_FIELDS: &[&str] = &[
    "name",
    "icon",
    "description",
    "ip_access",
    "enforce_tfa",
    "admin_access",
    "app_access",
];

/// Permission leaf attributes; `role`, `collection` and `action` form the leaf's key.
pub const PERMISSION_FIELDS: &[&str] = &["permissions", "validation", "presets", "fields"];

pub const TRANSLATION_FIELDS: &[&str] = &["value"];

/// Compute the patch that brings `existing` in line with `desired` over `fields`.
///
/// A field counts as changed when `desired` specifies it and `existing` either lacks it or holds
/// a different value. Arrays are compared without regard to order. An empty patch means the pair
/// already agrees.
pub fn diff_attributes(existing: &Record, desired: &Record, fields: &[&str]) -> Record {
    let mut patch = Record::new();
    for field in fields {
        let Some(wanted) = desired.get(*field) else {
            continue;
        };
        match existing.get(*field) {
            Some(current) if values_equal(current, wanted) => {}
            _ => {
                patch.insert((*field).to_string(), wanted.clone());
            }
        }
    }
    patch
}

/// Equality with order-insensitive comparison of top-level arrays.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && sorted_repr(left) == sorted_repr(right)
        }
        _ => a == b,
    }
}

/// Sort an array-valued field in place, leaving any other shape untouched.
pub fn sort_array_field(record: &mut Record, field: &str) {
    if let Some(Value::Array(items)) = record.get_mut(field) {
        items.sort_by_key(|v| v.to_string());
    }
}

fn sorted_repr(values: &[Value]) -> Vec<String> {
    let mut repr: Vec<String> = values.iter().map(Value::to_string).collect();
    repr.sort();
    repr
}
