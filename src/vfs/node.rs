use serde::{Deserialize, Serialize};

use super::path::{is_container, name_of};

/// The two kinds of node a locator can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Leaf,
}

impl ResourceKind {
    /// Classify a locator by its trailing separator.
    pub fn of(url: &str) -> Self {
        if is_container(url) {
            ResourceKind::Container
        } else {
            ResourceKind::Leaf
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ResourceKind::Container)
    }
}

/// One child of a container as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildEntry {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ChildEntry {
    pub fn new(url: &str, root: &str) -> Self {
        ChildEntry {
            url: url.to_string(),
            name: name_of(url, root),
            kind: ResourceKind::of(url),
            content_type: None,
            updated: None,
            size: None,
        }
    }

    /// Name as shown in listings; containers get a trailing `/`.
    pub fn display_name(&self) -> String {
        if self.kind.is_container() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_url() {
        assert_eq!(ResourceKind::of("https://pod.example/a/"), ResourceKind::Container);
        assert_eq!(ResourceKind::of("https://pod.example/a"), ResourceKind::Leaf);
    }

    #[test]
    fn test_child_entry_json() {
        let entry = ChildEntry::new("https://pod.example/my%20docs/", "https://pod.example/");
        assert_eq!(entry.name, "my docs");
        assert_eq!(entry.display_name(), "my docs/");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "container");
        assert!(value.get("contentType").is_none());
    }
}
