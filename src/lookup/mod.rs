//! Resolve loose user identifiers to canonical record ids.
//!
//! Matching runs in three phases and the first phase with any hit wins:
//! exact id, then the table's short id (equal or prefix), then a
//! case-insensitive display-name match (equal or substring).

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::store::{Contact, Group, Profile};

/// Outcome of a lookup. `Found` always carries the canonical row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Found { id: String },
    NotFound,
}

impl Serialize for LookupResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LookupResult::Found { id } => {
                let mut s = serializer.serialize_struct("LookupResult", 2)?;
                s.serialize_field("found", &true)?;
                s.serialize_field("id", id)?;
                s.end()
            }
            LookupResult::NotFound => {
                let mut s = serializer.serialize_struct("LookupResult", 1)?;
                s.serialize_field("found", &false)?;
                s.end()
            }
        }
    }
}

impl LookupResult {
    pub fn id(&self) -> Option<&str> {
        match self {
            LookupResult::Found { id } => Some(id.as_str()),
            LookupResult::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LookupResult::Found { .. })
    }
}

/// A record that can be found by loose identifiers.
pub trait Lookup {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Human-typeable trailing fragment of `id`.
    fn short_id(id: &str) -> &str;
}

/// Fragment after `#`, or the last path segment when there is none.
fn fragment_or_last_segment(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((_, fragment)) if !fragment.is_empty() => fragment,
        _ => last_segment(id),
    }
}

fn last_segment(id: &str) -> &str {
    id.trim_end_matches('/').rsplit('/').next().unwrap_or(id)
}

impl Lookup for Profile {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn short_id(id: &str) -> &str {
        fragment_or_last_segment(id)
    }
}

impl Lookup for Contact {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn short_id(id: &str) -> &str {
        last_segment(id)
    }
}

impl Lookup for Group {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn short_id(id: &str) -> &str {
        fragment_or_last_segment(id)
    }
}

/// Find the best match for `query` among `rows`.
pub fn find<T: Lookup>(rows: &[T], query: &str) -> LookupResult {
    let query = query.trim();
    if query.is_empty() {
        return LookupResult::NotFound;
    }

    let hit = rows
        .iter()
        .find(|r| r.id() == query)
        .or_else(|| {
            rows.iter().find(|r| {
                let short = T::short_id(r.id());
                !short.is_empty() && short.starts_with(query)
            })
        })
        .or_else(|| {
            let needle = query.to_lowercase();
            rows.iter()
                .find(|r| r.display_name().to_lowercase() == needle)
                .or_else(|| {
                    rows.iter()
                        .find(|r| r.display_name().to_lowercase().contains(&needle))
                })
        });

    match hit {
        Some(row) => LookupResult::Found {
            id: row.id().to_string(),
        },
        None => LookupResult::NotFound,
    }
}
