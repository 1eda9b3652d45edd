//! Object key and filename sanitization.
//!
//! # Design Decisions
//! - Paths are rejected, never repaired: they become storage keys directly
//! - Filenames are repaired, never rejected: they only name the object
//! - Assembled keys are validated again after concatenation

/// Replacement used when a filename has nothing usable left.
pub const PLACEHOLDER_NAME: &str = "unnamed";

/// Maximum filename length in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;

const RESERVED_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// A path or key that would escape the gallery namespace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path: {0}")]
pub struct InvalidPath(pub String);

/// Validate an upload path or object key.
///
/// Rejects a leading `/` or `\` and any `..` segment under either separator.
pub fn sanitize_path(path: &str) -> Result<&str, InvalidPath> {
    let rooted = path.starts_with('/') || path.starts_with('\\');
    let escapes = path.split(['/', '\\']).any(|segment| segment == "..");

    if rooted || escapes {
        return Err(InvalidPath(path.to_string()));
    }
    Ok(path)
}

/// Turn a client-supplied filename into a safe object name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut name: String = base
        .chars()
        .filter(|c| !c.is_control() && !RESERVED_CHARS.contains(c))
        .collect();

    if name == "." || name == ".." {
        name = PLACEHOLDER_NAME.to_string();
    }
    if name.starts_with('.') {
        name = format!("{PLACEHOLDER_NAME}{name}");
    }

    name = collapse_runs(&name, '.');
    while name.ends_with('.') {
        name.pop();
    }

    if name.chars().count() > MAX_FILE_NAME_LEN {
        name = truncate_preserving_extension(&name);
    }

    if name.is_empty() {
        name = PLACEHOLDER_NAME.to_string();
    }
    name
}

/// Build the storage key for an upload: `prefix + path + sanitized name`.
///
/// Both the path and the assembled key must pass `sanitize_path`.
pub fn build_object_key(prefix: &str, path: &str, file_name: &str) -> Result<String, InvalidPath> {
    let path = sanitize_path(path)?;

    let mut key = String::with_capacity(prefix.len() + path.len() + file_name.len() + 1);
    key.push_str(prefix);
    key.push_str(path);
    if !path.is_empty() && !path.ends_with('/') {
        key.push('/');
    }
    key.push_str(&sanitize_file_name(file_name));

    let key = collapse_runs(&key, '/');
    sanitize_path(&key)?;
    Ok(key)
}

/// Check a MIME type against a comma-separated allow list. Empty allows all.
pub fn is_allowed_file_type(content_type: &str, allowed: &str) -> bool {
    if allowed.trim().is_empty() {
        return true;
    }
    allowed
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == content_type)
}

fn collapse_runs(input: &str, target: char) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous = None;
    for c in input.chars() {
        if c == target && previous == Some(target) {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }
    out
}

fn truncate_preserving_extension(name: &str) -> String {
    if let Some((stem, extension)) = name.rsplit_once('.') {
        let ext_len = extension.chars().count();
        let stem_budget = MAX_FILE_NAME_LEN.saturating_sub(ext_len + 1);
        if !stem.is_empty() && stem_budget > 0 {
            let stem: String = stem.chars().take(stem_budget).collect();
            let stem = stem.trim_end_matches('.');
            if !stem.is_empty() {
                return format!("{stem}.{extension}");
            }
        }
    }

    let truncated: String = name.chars().take(MAX_FILE_NAME_LEN).collect();
    truncated.trim_end_matches('.').to_string()
}
