//! Helpers for sanitizing caller-supplied names before they reach span
//! attributes or storage keys.

/// Longest original name recorded in span fields.
const MAX_SPAN_NAME_CHARS: usize = 64;

/// Last component of a client-supplied name, split on both `/` and `\\`
/// regardless of the host platform.
pub fn base_name(original_name: &str) -> &str {
    original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name)
}

/// Shortens an uploaded file name for span fields, dropping any directory
/// the client sent along with it.
pub fn span_name(original_name: &str) -> String {
    let base = base_name(original_name);
    if base.chars().count() <= MAX_SPAN_NAME_CHARS {
        return base.to_string();
    }
    let mut short: String = base.chars().take(MAX_SPAN_NAME_CHARS).collect();
    short.push('…');
    short
}

/// Checks that `name` is a bare artifact file name.
///
/// Returns `None` for anything that could address a blob outside its
/// run namespace.
pub fn artifact_file_name(name: &str) -> Option<&str> {
    let name = name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return None;
    }
    Some(name)
}
