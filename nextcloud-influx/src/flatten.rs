//! Flattening of nested serverinfo payloads into InfluxDB fields
//!
//! Objects contribute `key.` path segments, arrays of containers contribute
//! `index.` segments. Arrays holding only scalars are kept whole as a single
//! field, so `cpuload: [0.6, 0.62, 0.56]` stays one value.

use crate::error::StructureError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat field map, keyed by dotted path
pub type FlatRecord = BTreeMap<String, Value>;

pub const SEPARATOR: char = '.';

/// Flattens an object tree. The root must be an object.
pub fn flatten(tree: &Value) -> Result<FlatRecord, StructureError> {
    if !tree.is_object() {
        return Err(StructureError::NotAnObject {
            path: String::new(),
            found: kind(tree),
        });
    }

    let mut out = FlatRecord::new();
    let mut prefix = String::new();
    visit(tree, &mut prefix, &mut out);
    Ok(out)
}

/// Returns the `ocs.data` tree out of an OCS response envelope
pub fn extract_payload(envelope: &Value) -> Result<&Value, StructureError> {
    let ocs = envelope
        .get("ocs")
        .ok_or_else(|| StructureError::MissingField("ocs".into()))?;
    let data = ocs
        .get("data")
        .ok_or_else(|| StructureError::MissingField("ocs.data".into()))?;

    if !data.is_object() {
        return Err(StructureError::NotAnObject {
            path: "ocs.data".into(),
            found: kind(data),
        });
    }
    Ok(data)
}

/// `extract_payload` followed by `flatten`
pub fn flatten_envelope(envelope: &Value) -> Result<FlatRecord, StructureError> {
    flatten(extract_payload(envelope)?)
}

fn visit(node: &Value, prefix: &mut String, out: &mut FlatRecord) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                descend(child, key, prefix, out);
            }
        }
        Value::Array(items) if !is_scalar_array(items) => {
            for (i, child) in items.iter().enumerate() {
                descend(child, &i.to_string(), prefix, out);
            }
        }
        leaf => {
            let path = prefix.strip_suffix(SEPARATOR).unwrap_or(prefix.as_str());
            // last write wins on colliding paths
            out.insert(path.to_string(), leaf.clone());
        }
    }
}

fn descend(child: &Value, segment: &str, prefix: &mut String, out: &mut FlatRecord) {
    let len = prefix.len();
    prefix.push_str(segment);
    prefix.push(SEPARATOR);
    visit(child, prefix, out);
    prefix.truncate(len);
}

fn is_scalar_array(items: &[Value]) -> bool {
    items.iter().all(|v| !v.is_object() && !v.is_array())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
