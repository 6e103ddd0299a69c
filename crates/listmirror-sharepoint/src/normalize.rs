//! Normalization of raw list items into flat records.
//!
//! Nested objects are flattened with dot-joined names, metadata fields
//! are dropped, and literal dots are replaced with underscores so field
//! names stay safe as storage-layer identifiers.

use serde_json::Value;

use listmirror_core::record::{FieldValue, ListRecord};

/// Reserved prefix marking protocol metadata fields (`__metadata`,
/// `__deferred`, `__next`, ...).
const METADATA_PREFIX: &str = "__";

/// Flatten a raw list item into a [`ListRecord`].
///
/// - nested objects contribute `parent.child`-style names, then every dot
///   is replaced with an underscore
/// - any name segment starting with `__` is dropped along with its subtree
/// - scalars map onto [`FieldValue`]; arrays are kept as JSON text
///
/// A non-object item produces an empty record.
pub fn normalize_item(item: &Value) -> ListRecord {
    let mut record = ListRecord::new();
    if let Value::Object(map) = item {
        flatten_into(&mut record, "", map);
    }
    record
}

fn flatten_into(record: &mut ListRecord, prefix: &str, map: &serde_json::Map<String, Value>) {
    for (key, value) in map {
        if key.starts_with(METADATA_PREFIX) {
            continue;
        }

        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Object(nested) => flatten_into(record, &name, nested),
            other => {
                record.insert(name.replace('.', "_"), FieldValue::from_json(other));
            }
        }
    }
}
