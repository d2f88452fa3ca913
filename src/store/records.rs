//! Typed rows for every table in the store.
//!
//! Rows are validated when they are written or imported; a row that made it
//! into the store is trusted on read.

use serde::{Deserialize, Serialize};

use crate::vfs::path::{SEPARATOR, is_container, validate_name};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Prefixes of a fully qualified class identifier.
pub const QUALIFIED_PREFIXES: [&str; 3] = ["http://", "https://", "urn:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Resource,
    Profile,
    Contact,
    Group,
    TypeIndex,
    Script,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Resource,
        Table::Profile,
        Table::Contact,
        Table::Group,
        Table::TypeIndex,
        Table::Script,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Resource => "resource",
            Table::Profile => "profile",
            Table::Contact => "contact",
            Table::Group => "group",
            Table::TypeIndex => "type_index",
            Table::Script => "script",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in the virtual pod: one container or leaf resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    pub url: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub updated: String,
}

impl ResourceRow {
    fn check(&self) -> Result<(), String> {
        if !self.url.contains("://") {
            return Err(format!("resource url is not absolute: {}", self.url));
        }
        if is_container(&self.url) {
            if self.content.is_some() {
                return Err("container rows cannot hold content".into());
            }
        } else if !self.children.is_empty() {
            return Err("leaf rows cannot have children".into());
        }
        if let Some(parent) = &self.parent {
            if !is_container(parent) || !self.url.starts_with(parent.as_str()) || parent == &self.url {
                return Err(format!("parent {parent} does not contain {}", self.url));
            }
        }
        for child in &self.children {
            let rest = child.strip_prefix(self.url.as_str()).unwrap_or("");
            if rest.is_empty() || rest.trim_end_matches(SEPARATOR).contains(SEPARATOR) {
                return Err(format!("{child} is not a direct child of {}", self.url));
            }
        }
        Ok(())
    }
}

/// An identity profile (`foaf:Person`-like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nick: Option<String>,
}

impl Profile {
    fn check(&self) -> Result<(), String> {
        check_id(&self.id)?;
        check_display_name(&self.name)
    }
}

/// An address-book entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Contact {
    fn check(&self) -> Result<(), String> {
        check_id(&self.id)?;
        check_display_name(&self.name)?;
        if let Some(email) = &self.email {
            let valid = email
                .split_once('@')
                .is_some_and(|(user, host)| !user.is_empty() && !host.is_empty());
            if !valid {
                return Err(format!("invalid email address: {email}"));
            }
        }
        Ok(())
    }
}

/// A named set of contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    fn check(&self) -> Result<(), String> {
        check_id(&self.id)?;
        check_display_name(&self.name)?;
        for (i, member) in self.members.iter().enumerate() {
            if self.members[..i].contains(member) {
                return Err(format!("duplicate group member: {member}"));
            }
        }
        Ok(())
    }
}

/// Partition of the type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Public,
    Private,
}

impl IndexType {
    pub const BOTH: [IndexType; 2] = [IndexType::Public, IndexType::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Public => "public",
            IndexType::Private => "private",
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or many instance locators.
///
/// Persisted as a bare string for a single instance and as a JSON-array
/// encoded string for several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Instances {
    One(String),
    Many(Vec<String>),
}

impl Instances {
    pub fn from_vec(mut urls: Vec<String>) -> Option<Self> {
        match urls.len() {
            0 => None,
            1 => urls.pop().map(Instances::One),
            _ => Some(Instances::Many(urls)),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Instances::One(url) => vec![url.clone()],
            Instances::Many(urls) => urls.clone(),
        }
    }
}

impl From<Instances> for String {
    fn from(instances: Instances) -> Self {
        match instances {
            Instances::One(url) => url,
            Instances::Many(urls) => serde_json::to_string(&urls).unwrap_or_default(),
        }
    }
}

impl TryFrom<String> for Instances {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim_start().starts_with('[') {
            let urls: Vec<String> =
                serde_json::from_str(&value).map_err(|e| format!("invalid instance list: {e}"))?;
            Instances::from_vec(urls).ok_or_else(|| "empty instance list".to_string())
        } else {
            Ok(Instances::One(value))
        }
    }
}

/// Where records of one class live, for one index type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRegistration {
    pub for_class: String,
    pub index_type: IndexType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instances>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_container: Option<String>,
}

impl TypeRegistration {
    /// Row key: one record per `(indexType, forClass)` pair.
    pub fn row_key(index_type: IndexType, for_class: &str) -> String {
        format!("{index_type}|{for_class}")
    }

    pub fn instances(&self) -> Vec<String> {
        self.instance.as_ref().map(Instances::to_vec).unwrap_or_default()
    }

    fn check(&self) -> Result<(), String> {
        if self.for_class.trim().is_empty() {
            return Err("forClass cannot be empty".into());
        }
        if !QUALIFIED_PREFIXES.iter().any(|p| self.for_class.starts_with(p)) {
            return Err(format!("forClass must be a full class identifier: {}", self.for_class));
        }
        for url in self.instances() {
            if !url.contains("://") {
                return Err(format!("instance is not an absolute locator: {url}"));
            }
        }
        if self.instance.is_none() && self.instance_container.is_none() {
            return Err(format!(
                "registration for {} needs an instance or an instance container",
                self.for_class
            ));
        }
        if let Some(container) = &self.instance_container {
            if !container.contains("://") || !is_container(container) {
                return Err(format!("instance container must be an absolute locator ending with '/': {container}"));
            }
        }
        Ok(())
    }
}

/// A saved sequence of command lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

impl Script {
    fn check(&self) -> Result<(), String> {
        validate_name(&self.name).map_err(|e| e.message)?;
        if self.name.contains(char::is_whitespace) {
            return Err(format!("script name cannot contain whitespace: {}", self.name));
        }
        if self.lines.iter().any(|l| l.trim().is_empty()) {
            return Err("script lines cannot be blank".into());
        }
        Ok(())
    }
}

fn check_id(id: &str) -> Result<(), String> {
    if !id.contains("://") {
        return Err(format!("record id is not an absolute locator: {id}"));
    }
    Ok(())
}

fn check_display_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name cannot be empty".into());
    }
    Ok(())
}

/// Any row, tagged with its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Record {
    Resource(ResourceRow),
    Profile(Profile),
    Contact(Contact),
    Group(Group),
    TypeIndex(TypeRegistration),
    Script(Script),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Resource(_) => Table::Resource,
            Record::Profile(_) => Table::Profile,
            Record::Contact(_) => Table::Contact,
            Record::Group(_) => Table::Group,
            Record::TypeIndex(_) => Table::TypeIndex,
            Record::Script(_) => Table::Script,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Record::Resource(r) => r.key(),
            Record::Profile(r) => r.key(),
            Record::Contact(r) => r.key(),
            Record::Group(r) => r.key(),
            Record::TypeIndex(r) => r.key(),
            Record::Script(r) => r.key(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Record::Resource(r) => r.validate(),
            Record::Profile(r) => r.validate(),
            Record::Contact(r) => r.validate(),
            Record::Group(r) => r.validate(),
            Record::TypeIndex(r) => r.validate(),
            Record::Script(r) => r.validate(),
        }
    }
}

/// A row type that lives in exactly one table.
pub trait TableRecord: Clone + Sized {
    const TABLE: Table;

    /// Unique key within the table.
    fn key(&self) -> String;

    fn validate(&self) -> Result<(), String>;

    fn into_record(self) -> Record;

    fn from_record(record: &Record) -> Option<&Self>;
}

macro_rules! table_record {
    ($ty:ty, $variant:ident, |$row:ident| $key:expr) => {
        impl TableRecord for $ty {
            const TABLE: Table = Table::$variant;

            fn key(&self) -> String {
                let $row = self;
                $key
            }

            fn validate(&self) -> Result<(), String> {
                self.check()
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: &Record) -> Option<&Self> {
                match record {
                    Record::$variant(row) => Some(row),
                    _ => None,
                }
            }
        }
    };
}

table_record!(ResourceRow, Resource, |r| r.url.clone());
table_record!(Profile, Profile, |r| r.id.clone());
table_record!(Contact, Contact, |r| r.id.clone());
table_record!(Group, Group, |r| r.id.clone());
table_record!(TypeRegistration, TypeIndex, |r| TypeRegistration::row_key(
    r.index_type,
    &r.for_class
));
table_record!(Script, Script, |r| r.name.clone());

/// A full export of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub records: Vec<Record>,
}
