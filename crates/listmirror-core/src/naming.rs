//! Column-name cleaning for storage-layer identifiers.
//!
//! The same rule must be applied when a table is created and when rows are
//! written to it, or the insert will fail to match columns.

/// Placeholder used when cleaning strips a name down to nothing.
const EMPTY_NAME_PLACEHOLDER: &str = "column";

/// Clean a remote field name into a safe destination column identifier.
///
/// Rules: `.`, space and `-` become `_`; any remaining character that is
/// not ASCII alphanumeric or underscore is stripped; a leading digit gets
/// a `col_` prefix; an empty result becomes a fixed placeholder; the
/// result is lower-cased.
///
/// The function is idempotent: `clean_column_name(clean_column_name(x))`
/// equals `clean_column_name(x)` for any input.
pub fn clean_column_name(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| match c {
            '.' | ' ' | '-' => '_',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if cleaned.is_empty() {
        cleaned = EMPTY_NAME_PLACEHOLDER.to_string();
    }

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert_str(0, "col_");
    }

    cleaned.to_ascii_lowercase()
}
