//! In-process table store.
//!
//! [`Store`] is a cheap, cloneable handle over typed tables. Writes are
//! validated before they land, listeners are notified after every successful
//! mutation, and whole-store snapshots can be exported and imported.

pub mod records;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::error::{CommandError, ErrorKind};
use crate::vfs::path::{SEPARATOR, as_container, is_container, parent_url, segments};
pub use records::{
    Contact, Group, IndexType, Instances, Profile, QUALIFIED_PREFIXES, Record, ResourceRow,
    SNAPSHOT_VERSION, Script, Snapshot, Table, TableRecord, TypeRegistration,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid {table} row '{key}': {reason}")]
    Invalid {
        table: Table,
        key: String,
        reason: String,
    },

    #[error("Unsupported snapshot version {0} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("Malformed snapshot: {0}")]
    Malformed(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::Invalid { .. } => ErrorKind::InvalidEntity,
            StoreError::UnsupportedVersion(_) | StoreError::Malformed(_) => {
                ErrorKind::InvalidArgument
            }
            StoreError::Poisoned => ErrorKind::OperationFailed,
        };
        CommandError::new(kind, err.to_string())
    }
}

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Put,
    Delete,
    Clear,
}

/// Notification sent to subscribers after a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub table: Table,
    pub key: Option<String>,
    pub change: Change,
}

pub type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

type Tables = HashMap<Table, BTreeMap<String, Record>>;

/// A row that was left out of a non-strict import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub index: usize,
    pub table: Option<Table>,
    pub key: Option<String>,
    pub reason: String,
}

/// Outcome of [`Store::import_json`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Handle to the shared tables.
#[derive(Clone, Default)]
pub struct Store {
    tables: Arc<RwLock<Tables>>,
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every subsequent mutation.
    pub fn subscribe(&self, listener: Listener) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    fn notify(&self, event: StoreEvent) {
        let listeners = match self.listeners.read() {
            Ok(l) => l.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Fetch a row by key.
    pub fn get<T: TableRecord>(&self, key: &str) -> Option<T> {
        let tables = self.tables.read().ok()?;
        tables
            .get(&T::TABLE)
            .and_then(|rows| rows.get(key))
            .and_then(T::from_record)
            .cloned()
    }

    pub fn contains<T: TableRecord>(&self, key: &str) -> bool {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(&T::TABLE).map(|rows| rows.contains_key(key)))
            .unwrap_or(false)
    }

    /// All rows of a table, ordered by key.
    pub fn all<T: TableRecord>(&self) -> Vec<T> {
        self.tables
            .read()
            .ok()
            .and_then(|t| {
                t.get(&T::TABLE)
                    .map(|rows| rows.values().filter_map(T::from_record).cloned().collect())
            })
            .unwrap_or_default()
    }

    pub fn is_empty<T: TableRecord>(&self) -> bool {
        self.len(T::TABLE) == 0
    }

    pub fn len(&self, table: Table) -> usize {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(&table).map(|rows| rows.len()))
            .unwrap_or(0)
    }

    /// Validate and insert or overwrite a row.
    pub fn put<T: TableRecord>(&self, row: T) -> Result<(), StoreError> {
        let key = row.key();
        row.validate().map_err(|reason| StoreError::Invalid {
            table: T::TABLE,
            key: key.clone(),
            reason,
        })?;
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
            tables
                .entry(T::TABLE)
                .or_default()
                .insert(key.clone(), row.into_record());
        }
        self.notify(StoreEvent {
            table: T::TABLE,
            key: Some(key),
            change: Change::Put,
        });
        Ok(())
    }

    /// Remove a row; returns whether it existed.
    pub fn delete<T: TableRecord>(&self, key: &str) -> bool {
        let removed = match self.tables.write() {
            Ok(mut tables) => tables
                .get_mut(&T::TABLE)
                .and_then(|rows| rows.remove(key))
                .is_some(),
            Err(_) => false,
        };
        if removed {
            self.notify(StoreEvent {
                table: T::TABLE,
                key: Some(key.to_string()),
                change: Change::Delete,
            });
        }
        removed
    }

    /// Drop every row of a table.
    pub fn clear<T: TableRecord>(&self) {
        if let Ok(mut tables) = self.tables.write() {
            tables.remove(&T::TABLE);
        }
        self.notify(StoreEvent {
            table: T::TABLE,
            key: None,
            change: Change::Clear,
        });
    }

    /// Insert `rows` only if the table holds no rows at all.
    ///
    /// The emptiness check and the inserts happen under a single write lock.
    pub fn seed_if_empty<T: TableRecord>(&self, rows: Vec<T>) -> Result<bool, StoreError> {
        for row in &rows {
            row.validate().map_err(|reason| StoreError::Invalid {
                table: T::TABLE,
                key: row.key(),
                reason,
            })?;
        }
        let keys: Vec<String> = {
            let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
            let table = tables.entry(T::TABLE).or_default();
            if !table.is_empty() {
                return Ok(false);
            }
            rows.into_iter()
                .map(|row| {
                    let key = row.key();
                    table.insert(key.clone(), row.into_record());
                    key
                })
                .collect()
        };
        for key in keys {
            self.notify(StoreEvent {
                table: T::TABLE,
                key: Some(key),
                change: Change::Put,
            });
        }
        Ok(true)
    }

    /// Export every table.
    pub fn export(&self) -> Snapshot {
        let records = self
            .tables
            .read()
            .map(|tables| {
                Table::ALL
                    .iter()
                    .filter_map(|t| tables.get(t))
                    .flat_map(|rows| rows.values().cloned())
                    .collect()
            })
            .unwrap_or_default();
        Snapshot {
            version: SNAPSHOT_VERSION,
            records,
        }
    }

    /// Import a JSON snapshot, merging rows by key.
    ///
    /// Resource rows must live under `root` and hang off a container that
    /// already exists or arrives in the same snapshot. Their child lists are
    /// rebuilt from `parent` links, so rows already in the store stay listed.
    ///
    /// Strict mode rejects the whole snapshot if any row is invalid and
    /// writes nothing. Otherwise invalid rows are skipped and reported.
    pub fn import_json(
        &self,
        text: &str,
        strict: bool,
        root: &str,
    ) -> Result<ImportReport, StoreError> {
        let raw: Value =
            serde_json::from_str(text).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let version = raw
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::Malformed("missing version".into()))?;
        if version != u64::from(SNAPSHOT_VERSION) {
            return Err(StoreError::UnsupportedVersion(
                u32::try_from(version).unwrap_or(u32::MAX),
            ));
        }
        let rows = raw
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Malformed("missing records array".into()))?;

        let mut report = ImportReport::default();
        let mut resources = Vec::new();
        let mut others = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let parsed = serde_json::from_value::<Record>(row.clone()).map_err(|e| e.to_string());
            match parsed.and_then(|record| record.validate().map(|_| record)) {
                Ok(Record::Resource(resource)) => resources.push((index, resource)),
                Ok(record) => others.push(record),
                Err(reason) => report.skip(index, row, reason, strict)?,
            }
        }
        // Parents are prefixes of their children, so shorter urls go first.
        resources.sort_by_key(|(_, resource)| resource.url.len());

        let mut touched = Vec::new();
        let mut linked = Vec::new();
        {
            let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
            let existing = tables.entry(Table::Resource).or_default();
            let mut known: HashSet<String> = existing.keys().cloned().collect();
            let mut placed = Vec::new();
            for (index, mut resource) in resources {
                match place_resource(&mut resource, root, &known) {
                    Ok(()) => {
                        known.insert(resource.url.clone());
                        placed.push(resource);
                    }
                    Err(reason) => report.skip(index, &rows[index], reason, strict)?,
                }
            }

            let stamp = Utc::now().to_rfc3339();
            for mut resource in placed {
                resource.children = existing
                    .get(&resource.url)
                    .and_then(ResourceRow::from_record)
                    .map(|current| current.children.clone())
                    .unwrap_or_default();
                let url = resource.url.clone();
                let parent = resource.parent.clone();
                existing.insert(url.clone(), resource.into_record());
                if let Some(Record::Resource(parent_row)) =
                    parent.as_ref().and_then(|p| existing.get_mut(p))
                {
                    if !parent_row.children.contains(&url) {
                        parent_row.children.push(url.clone());
                        parent_row.children.sort();
                        parent_row.updated = stamp.clone();
                        linked.push(parent_row.url.clone());
                    }
                }
                touched.push((Table::Resource, url));
            }

            for record in others {
                let (table, key) = (record.table(), record.key());
                tables.entry(table).or_default().insert(key.clone(), record);
                touched.push((table, key));
            }
        }
        report.imported = touched.len();
        debug!(imported = report.imported, skipped = report.skipped.len(), "snapshot imported");
        let relinked = linked
            .into_iter()
            .filter(|url| !touched.iter().any(|(t, k)| *t == Table::Resource && k == url))
            .map(|url| (Table::Resource, url))
            .collect::<Vec<_>>();
        for (table, key) in touched.into_iter().chain(relinked) {
            self.notify(StoreEvent {
                table,
                key: Some(key),
                change: Change::Put,
            });
        }
        Ok(report)
    }
}

impl ImportReport {
    /// Record a rejected row, or fail the whole import in strict mode.
    fn skip(&mut self, index: usize, row: &Value, reason: String, strict: bool) -> Result<(), StoreError> {
        let table = row
            .get("table")
            .cloned()
            .and_then(|t| serde_json::from_value::<Table>(t).ok());
        let key = row_key_hint(row);
        if strict {
            return Err(StoreError::Invalid {
                table: table.unwrap_or(Table::Resource),
                key: key.unwrap_or_else(|| format!("#{index}")),
                reason,
            });
        }
        warn!(index, %reason, "skipping invalid snapshot row");
        self.skipped.push(SkippedRow {
            index,
            table,
            key,
            reason,
        });
        Ok(())
    }
}

/// Check a resource row against the pod layout and fill in its parent.
fn place_resource(row: &mut ResourceRow, root: &str, known: &HashSet<String>) -> Result<(), String> {
    if !row.url.starts_with(root) {
        return Err(format!("{} is outside the pod root {root}", row.url));
    }
    if row.url == root {
        return match &row.parent {
            Some(_) => Err("the pod root cannot have a parent".into()),
            None => Ok(()),
        };
    }
    segments(&row.url, root).map_err(|e| e.message)?;
    let parent = parent_url(&row.url, root);
    if row.parent.as_ref().is_some_and(|p| *p != parent) {
        return Err(format!("parent of {} must be {parent}", row.url));
    }
    if !known.contains(&parent) {
        return Err(format!("parent container {parent} does not exist"));
    }
    let twin = if is_container(&row.url) {
        row.url.trim_end_matches(SEPARATOR).to_string()
    } else {
        as_container(&row.url)
    };
    if known.contains(&twin) {
        return Err(format!("{twin} already exists"));
    }
    row.parent = Some(parent);
    Ok(())
}

fn row_key_hint(row: &Value) -> Option<String> {
    ["url", "id", "name", "forClass"]
        .iter()
        .find_map(|k| row.get(*k).and_then(Value::as_str))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ROOT: &str = "https://pod.example/";

    fn resource(url: &str, parent: Option<&str>, children: &[&str]) -> ResourceRow {
        ResourceRow {
            url: url.to_string(),
            parent: parent.map(String::from),
            children: children.iter().map(|c| c.to_string()).collect(),
            content_type: None,
            content: (!is_container(url)).then(String::new),
            updated: String::new(),
        }
    }

    fn snapshot(records: Vec<Record>) -> String {
        serde_json::to_string(&Snapshot {
            version: SNAPSHOT_VERSION,
            records,
        })
        .unwrap()
    }

    fn script(name: &str) -> Script {
        Script {
            name: name.to_string(),
            lines: vec!["pwd".to_string()],
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = Store::new();
        store.put(script("a")).unwrap();
        assert_eq!(store.get::<Script>("a"), Some(script("a")));
        assert!(store.delete::<Script>("a"));
        assert!(!store.delete::<Script>("a"));
        assert!(store.is_empty::<Script>());
    }

    #[test]
    fn test_put_rejects_invalid() {
        let store = Store::new();
        let err = store
            .put(Script {
                name: "bad name".into(),
                lines: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid { table: Table::Script, .. }));
        assert!(store.is_empty::<Script>());
    }

    #[test]
    fn test_seed_if_empty_only_once() {
        let store = Store::new();
        assert!(store.seed_if_empty(vec![script("a"), script("b")]).unwrap());
        assert!(!store.seed_if_empty(vec![script("c")]).unwrap());
        assert_eq!(store.all::<Script>().len(), 2);
    }

    #[test]
    fn test_subscribe_sees_mutations() {
        let store = Store::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(Arc::new(move |event: &StoreEvent| {
            sink.lock().unwrap().push(event.change);
        }));
        store.put(script("a")).unwrap();
        store.delete::<Script>("a");
        store.clear::<Script>();
        assert_eq!(*seen.lock().unwrap(), vec![Change::Put, Change::Delete, Change::Clear]);
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = Store::new();
        store.put(script("a")).unwrap();
        let text = serde_json::to_string(&store.export()).unwrap();

        let other = Store::new();
        let report = other.import_json(&text, true, ROOT).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(other.get::<Script>("a"), Some(script("a")));
    }

    #[test]
    fn test_import_policies() {
        let text = r#"{"version":1,"records":[
            {"table":"script","name":"ok","lines":["ls"]},
            {"table":"contact","id":"not-absolute","name":"Bob"}
        ]}"#;

        let strict = Store::new();
        assert!(strict.import_json(text, true, ROOT).is_err());
        assert!(strict.is_empty::<Script>());

        let lenient = Store::new();
        let report = lenient.import_json(text, false, ROOT).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].table, Some(Table::Contact));
        assert_eq!(report.skipped[0].key.as_deref(), Some("not-absolute"));
        assert!(lenient.is_empty::<Contact>());
    }

    #[test]
    fn test_import_rejects_unknown_version() {
        let store = Store::new();
        let err = store.import_json(r#"{"version":9,"records":[]}"#, false, ROOT).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_import_merges_resource_children() {
        let store = Store::new();
        store.put(resource(ROOT, None, &["https://pod.example/keep.txt"])).unwrap();
        store.put(resource("https://pod.example/keep.txt", Some(ROOT), &[])).unwrap();

        let text = snapshot(vec![
            resource("https://pod.example/docs/a.txt", Some("https://pod.example/docs/"), &[]).into_record(),
            resource(ROOT, None, &["https://pod.example/docs/"]).into_record(),
            resource("https://pod.example/docs/", Some(ROOT), &["https://pod.example/docs/a.txt"]).into_record(),
        ]);
        let report = store.import_json(&text, true, ROOT).unwrap();
        assert_eq!(report.imported, 3);

        let root = store.get::<ResourceRow>(ROOT).unwrap();
        assert_eq!(root.children, vec!["https://pod.example/docs/", "https://pod.example/keep.txt"]);
        let docs = store.get::<ResourceRow>("https://pod.example/docs/").unwrap();
        assert_eq!(docs.children, vec!["https://pod.example/docs/a.txt"]);
    }

    #[test]
    fn test_import_rejects_misplaced_resources() {
        let store = Store::new();
        store.put(resource(ROOT, None, &[])).unwrap();
        let text = snapshot(vec![
            resource("https://evil.example/secret.txt", None, &[]).into_record(),
            resource("https://pod.example/ghost/orphan.txt", None, &[]).into_record(),
            resource("https://pod.example/ok.txt", Some(ROOT), &[]).into_record(),
        ]);

        assert!(store.import_json(&text, true, ROOT).is_err());
        assert!(!store.contains::<ResourceRow>("https://pod.example/ok.txt"));

        let report = store.import_json(&text, false, ROOT).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(!store.contains::<ResourceRow>("https://evil.example/secret.txt"));
        assert!(!store.contains::<ResourceRow>("https://pod.example/ghost/orphan.txt"));
        assert_eq!(
            store.get::<ResourceRow>(ROOT).unwrap().children,
            vec!["https://pod.example/ok.txt"]
        );
    }

    #[test]
    fn test_import_rejects_unexpanded_class() {
        let store = Store::new();
        let text = r#"{"version":1,"records":[
            {"table":"type_index","forClass":"vcard:Individual","indexType":"public","instanceContainer":"https://pod.example/contacts/"}
        ]}"#;
        assert!(store.import_json(text, true, ROOT).is_err());
        let report = store.import_json(text, false, ROOT).unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped[0].key.as_deref(), Some("vcard:Individual"));
        assert!(store.is_empty::<TypeRegistration>());
    }
}
