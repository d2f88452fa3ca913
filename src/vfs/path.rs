//! Locator and segment helpers.
//!
//! A locator is a fully-qualified resource address under a fixed root.
//! Containers end with `/`, leaf resources never do. Segments are stored
//! percent-encoded and are always decoded before validation.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::CommandError;

/// Path separator for locators.
pub const SEPARATOR: char = '/';

/// Longest accepted segment name, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Everything except the unreserved set `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Validate a single decoded segment name.
pub fn validate_name(name: &str) -> Result<(), CommandError> {
    if name.trim().is_empty() {
        return Err(CommandError::invalid_path("Name cannot be empty"));
    }
    if name.contains(SEPARATOR) {
        return Err(CommandError::invalid_path(format!(
            "Name cannot contain '{SEPARATOR}': {name}"
        )));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CommandError::invalid_path(format!(
            "Name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(|c| (c as u32) < 0x20 || c as u32 == 0x7f) {
        return Err(CommandError::invalid_path(
            "Name cannot contain control characters",
        ));
    }
    Ok(())
}

/// Percent-encode a segment name for use inside a locator.
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

/// Decode a percent-encoded segment.
///
/// A `%` that is not followed by two hex digits, or an escape sequence that
/// does not decode to UTF-8, is an error.
pub fn decode_segment(segment: &str) -> Result<String, CommandError> {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(CommandError::invalid_path(format!(
                    "Malformed escape in segment: {segment}"
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| CommandError::invalid_path(format!("Segment is not valid UTF-8: {segment}")))
}

/// Whether a locator addresses a container.
pub fn is_container(url: &str) -> bool {
    url.ends_with(SEPARATOR)
}

/// Ensure a locator has container form.
pub fn as_container(url: &str) -> String {
    if is_container(url) {
        url.to_string()
    } else {
        format!("{url}{SEPARATOR}")
    }
}

/// Logical parent container of `url`, never above `root`.
pub fn parent_url(url: &str, root: &str) -> String {
    if url == root || !url.starts_with(root) || url.len() <= root.len() {
        return root.to_string();
    }
    let trimmed = url.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) if pos + 1 >= root.len() => trimmed[..=pos].to_string(),
        _ => root.to_string(),
    }
}

/// Decoded segment names from `root` down to `url`.
///
/// Empty when `url` is not under `root`.
pub fn segments(url: &str, root: &str) -> Result<Vec<String>, CommandError> {
    let Some(rest) = url.strip_prefix(root) else {
        return Ok(Vec::new());
    };
    rest.split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect()
}

/// Decoded display name of the last segment (empty for the root).
pub fn name_of(url: &str, root: &str) -> String {
    segments(url, root)
        .ok()
        .and_then(|mut s| s.pop())
        .unwrap_or_default()
}

/// Append a child name to a container locator.
pub fn child_url(container: &str, name: &str, container_child: bool) -> String {
    let mut url = as_container(container);
    url.push_str(&encode_segment(name));
    if container_child {
        url.push(SEPARATOR);
    }
    url
}

/// Normalize a configured root: non-empty, container form.
pub fn normalize_root(root: &str) -> Result<String, CommandError> {
    let root = root.trim();
    if root.is_empty() {
        return Err(CommandError::invalid_path("Root locator cannot be empty"));
    }
    if !root.contains("://") {
        return Err(CommandError::invalid_path(format!(
            "Root locator must be absolute (scheme://host/): {root}"
        )));
    }
    Ok(as_container(root))
}
