use serde::Serialize;

use super::path::{
    SEPARATOR, as_container, decode_segment, encode_segment, is_container, parent_url,
    validate_name,
};
use crate::error::{CommandError, ErrorKind};

/// A successfully resolved locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPath {
    pub url: String,
    pub is_container: bool,
}

impl ResolvedPath {
    fn new(url: String) -> Self {
        let is_container = is_container(&url);
        ResolvedPath { url, is_container }
    }
}

pub type ResolveResult = Result<ResolvedPath, CommandError>;

/// Resolve a user-typed path against the current location and the root.
///
/// Absolute inputs (leading `/`) start from `root`, everything else from
/// `current`. `..` never climbs above `root`, and a result outside the root
/// subtree is reported as [`ErrorKind::EscapeAttempt`]. Nothing here touches
/// the store.
pub fn resolve_path(current: &str, input: &str, root: &str) -> ResolveResult {
    if input.is_empty() || input == "." {
        return Ok(ResolvedPath::new(current.to_string()));
    }

    if input == ".." || input == "../" {
        return Ok(ResolvedPath {
            url: parent_url(current, root),
            is_container: true,
        });
    }

    let (base, remainder) = match input.strip_prefix(SEPARATOR) {
        Some(rest) => (root, rest),
        None => (current, input),
    };

    let mut url = as_container(base);
    let mut consumed = 0usize;
    let mut ended_on_parent = false;

    for raw in remainder
        .split(SEPARATOR)
        .filter(|s| !s.is_empty() && *s != ".")
    {
        consumed += 1;
        if raw == ".." {
            url = parent_url(&url, root);
            ended_on_parent = true;
            continue;
        }
        ended_on_parent = false;

        let name = decode_segment(raw).map_err(|_| {
            CommandError::invalid_path(format!("Invalid path segment: {raw}"))
        })?;
        validate_name(&name)?;
        if name == "." || name == ".." {
            return Err(CommandError::invalid_path(format!(
                "Encoded traversal segment is not allowed: {raw}"
            )));
        }

        url.push_str(&encode_segment(&name));
        url.push(SEPARATOR);
    }

    if !url.starts_with(root) {
        return Err(CommandError::new(
            ErrorKind::EscapeAttempt,
            format!("Path escapes the pod root: {input}"),
        ));
    }

    if !input.ends_with(SEPARATOR) && consumed > 0 && !ended_on_parent && url != root {
        url.pop();
    }

    Ok(ResolvedPath::new(url))
}
