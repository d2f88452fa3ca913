//! The resource CRUD backend.
//!
//! Commands only ever talk to a [`ResourceStore`] with fully resolved,
//! validated locators. [`VirtualPod`] is the in-process implementation that
//! keeps one [`ResourceRow`] per container or leaf and maintains the
//! parent/child links between them.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

use crate::store::{ResourceRow, Store};
use crate::vfs::path::{is_container, parent_url};
use crate::vfs::{ChildEntry, ResourceKind};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const CONFLICT: u16 = 409;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl PodRequest {
    pub fn get(url: &str) -> Self {
        PodRequest {
            url: url.to_string(),
            method: Method::Get,
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn put(url: &str, body: Option<String>) -> Self {
        PodRequest {
            url: url.to_string(),
            method: Method::Put,
            body,
            headers: BTreeMap::new(),
        }
    }

    pub fn delete(url: &str) -> Self {
        PodRequest {
            url: url.to_string(),
            method: Method::Delete,
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodBody {
    Content(String),
    Listing(Vec<ChildEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodResponse {
    pub status: u16,
    pub body: Option<PodBody>,
    pub headers: BTreeMap<String, String>,
}

impl PodResponse {
    fn status(status: u16) -> Self {
        PodResponse {
            status,
            body: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content(&self) -> Option<&str> {
        match &self.body {
            Some(PodBody::Content(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn listing(&self) -> Option<&[ChildEntry]> {
        match &self.body {
            Some(PodBody::Listing(children)) => Some(children.as_slice()),
            _ => None,
        }
    }
}

/// Request/response contract of the CRUD backend.
pub trait ResourceStore: Send + Sync {
    /// Root locator every request must live under.
    fn root(&self) -> &str;

    fn handle(&self, request: PodRequest) -> PodResponse;
}

/// In-memory pod backed by the resource table of a [`Store`].
pub struct VirtualPod {
    store: Store,
    root: String,
}

impl VirtualPod {
    /// Open a pod rooted at `root` (container form), creating the root row if needed.
    pub fn new(store: Store, root: &str) -> Self {
        let pod = VirtualPod {
            store,
            root: root.to_string(),
        };
        if !pod.store.contains::<ResourceRow>(&pod.root) {
            let row = ResourceRow {
                url: pod.root.clone(),
                parent: None,
                children: Vec::new(),
                content_type: None,
                content: None,
                updated: now(),
            };
            if let Err(e) = pod.store.put(row) {
                tracing::error!(error = %e, "failed to create pod root");
            }
        }
        pod
    }

    fn row(&self, url: &str) -> Option<ResourceRow> {
        self.store.get::<ResourceRow>(url)
    }

    fn get(&self, url: &str) -> PodResponse {
        let Some(row) = self.row(url) else {
            return PodResponse::status(status::NOT_FOUND);
        };
        let mut response = PodResponse::status(status::OK);
        if is_container(url) {
            let children = row
                .children
                .iter()
                .map(|child| self.describe(child))
                .collect();
            response.body = Some(PodBody::Listing(children));
        } else {
            let content_type = row
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            response.headers.insert(CONTENT_TYPE.to_string(), content_type);
            response.body = Some(PodBody::Content(row.content.unwrap_or_default()));
        }
        response
    }

    fn describe(&self, url: &str) -> ChildEntry {
        let mut entry = ChildEntry::new(url, &self.root);
        if let Some(row) = self.row(url) {
            entry.updated = Some(row.updated);
            if entry.kind == ResourceKind::Leaf {
                entry.size = Some(row.content.as_ref().map(|c| c.len() as u64).unwrap_or(0));
                entry.content_type = row.content_type;
            }
        }
        entry
    }

    fn put(&self, request: PodRequest) -> PodResponse {
        let url = request.url.as_str();
        let parent = parent_url(url, &self.root);
        let Some(mut parent_row) = self.row(&parent) else {
            return PodResponse::status(status::CONFLICT);
        };

        let existing = self.row(url);
        let container = is_container(url);
        let twin = if container {
            url.trim_end_matches('/').to_string()
        } else {
            format!("{url}/")
        };
        if self.row(&twin).is_some() {
            return PodResponse::status(status::CONFLICT);
        }
        if container && existing.is_some() {
            return PodResponse::status(status::CONFLICT);
        }

        let content_type = request
            .headers
            .get(CONTENT_TYPE)
            .cloned()
            .or_else(|| existing.as_ref().and_then(|r| r.content_type.clone()))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let row = ResourceRow {
            url: url.to_string(),
            parent: Some(parent.clone()),
            children: Vec::new(),
            content_type: (!container).then_some(content_type),
            content: if container { None } else { Some(request.body.unwrap_or_default()) },
            updated: now(),
        };
        if self.store.put(row).is_err() {
            return PodResponse::status(status::CONFLICT);
        }

        if existing.is_some() {
            return PodResponse::status(status::OK);
        }
        parent_row.children.push(url.to_string());
        parent_row.children.sort();
        parent_row.updated = now();
        if self.store.put(parent_row).is_err() {
            return PodResponse::status(status::CONFLICT);
        }
        PodResponse::status(status::CREATED)
    }

    fn delete(&self, url: &str) -> PodResponse {
        let Some(row) = self.row(url) else {
            return PodResponse::status(status::NOT_FOUND);
        };
        if !row.children.is_empty() {
            return PodResponse::status(status::CONFLICT);
        }
        self.store.delete::<ResourceRow>(url);
        if let Some(parent) = row.parent.as_deref().and_then(|p| self.row(p)) {
            let mut parent = parent;
            parent.children.retain(|c| c != url);
            parent.updated = now();
            if let Err(e) = self.store.put(parent) {
                tracing::error!(error = %e, "failed to unlink {url} from its parent");
            }
        }
        PodResponse::status(status::NO_CONTENT)
    }
}

impl ResourceStore for VirtualPod {
    fn root(&self) -> &str {
        &self.root
    }

    fn handle(&self, request: PodRequest) -> PodResponse {
        let method = request.method;
        let url = request.url.clone();
        let response = if !url.starts_with(&self.root) {
            PodResponse::status(status::METHOD_NOT_ALLOWED)
        } else {
            match method {
                Method::Get => self.get(&url),
                Method::Put | Method::Delete if url == self.root => {
                    PodResponse::status(status::METHOD_NOT_ALLOWED)
                }
                Method::Put => self.put(request),
                Method::Delete => self.delete(&url),
            }
        };
        debug!(%method, %url, status = response.status, "pod request");
        response
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://pod.example/";

    fn pod() -> VirtualPod {
        VirtualPod::new(Store::new(), ROOT)
    }

    #[test]
    fn test_root_exists() {
        let pod = pod();
        let response = pod.handle(PodRequest::get(ROOT));
        assert_eq!(response.status, status::OK);
        assert_eq!(response.listing().map(|l| l.len()), Some(0));
    }

    #[test]
    fn test_create_and_list() {
        let pod = pod();
        assert_eq!(pod.handle(PodRequest::put("https://pod.example/docs/", None)).status, status::CREATED);
        let put = PodRequest::put("https://pod.example/docs/a.txt", Some("hi".into()))
            .header(CONTENT_TYPE, "text/markdown");
        assert_eq!(pod.handle(put).status, status::CREATED);

        let listing = pod.handle(PodRequest::get("https://pod.example/docs/"));
        let children = listing.listing().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a.txt");
        assert_eq!(children[0].size, Some(2));
        assert_eq!(children[0].content_type.as_deref(), Some("text/markdown"));

        let read = pod.handle(PodRequest::get("https://pod.example/docs/a.txt"));
        assert_eq!(read.content(), Some("hi"));
        assert_eq!(read.headers.get(CONTENT_TYPE).map(String::as_str), Some("text/markdown"));
    }

    #[test]
    fn test_conflicts() {
        let pod = pod();
        assert_eq!(
            pod.handle(PodRequest::put("https://pod.example/missing/a.txt", None)).status,
            status::CONFLICT
        );
        pod.handle(PodRequest::put("https://pod.example/a/", None));
        assert_eq!(pod.handle(PodRequest::put("https://pod.example/a/", None)).status, status::CONFLICT);
        assert_eq!(pod.handle(PodRequest::put("https://pod.example/a", None)).status, status::CONFLICT);
        assert_eq!(pod.handle(PodRequest::put(ROOT, None)).status, status::METHOD_NOT_ALLOWED);
        assert_eq!(
            pod.handle(PodRequest::get("https://elsewhere.example/")).status,
            status::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_overwrite_leaf() {
        let pod = pod();
        let url = "https://pod.example/a.txt";
        assert_eq!(pod.handle(PodRequest::put(url, Some("1".into()))).status, status::CREATED);
        assert_eq!(pod.handle(PodRequest::put(url, Some("2".into()))).status, status::OK);
        assert_eq!(pod.handle(PodRequest::get(url)).content(), Some("2"));
        assert_eq!(pod.handle(PodRequest::get(ROOT)).listing().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let pod = pod();
        pod.handle(PodRequest::put("https://pod.example/d/", None));
        pod.handle(PodRequest::put("https://pod.example/d/f", None));
        assert_eq!(pod.handle(PodRequest::delete("https://pod.example/d/")).status, status::CONFLICT);
        assert_eq!(pod.handle(PodRequest::delete("https://pod.example/d/f")).status, status::NO_CONTENT);
        assert_eq!(pod.handle(PodRequest::delete("https://pod.example/d/")).status, status::NO_CONTENT);
        assert_eq!(pod.handle(PodRequest::delete("https://pod.example/d/")).status, status::NOT_FOUND);
        assert_eq!(pod.handle(PodRequest::delete(ROOT)).status, status::METHOD_NOT_ALLOWED);
        assert!(pod.handle(PodRequest::get(ROOT)).listing().unwrap().is_empty());
    }
}
