//! Type registry: which locations hold records of a given class.
//!
//! One [`TypeRegistration`] per `(index type, class)` pair. Short class
//! names such as `vcard:Individual` are expanded through a fixed alias table
//! before they are stored or queried.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::error::{CommandError, ErrorKind};
use crate::store::{IndexType, Instances, QUALIFIED_PREFIXES, Store, TypeRegistration};
use crate::vfs::path::is_container;

/// Short prefix to namespace.
pub const ALIASES: &[(&str, &str)] = &[
    ("vcard", "http://www.w3.org/2006/vcard/ns#"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("schema", "http://schema.org/"),
    ("solid", "http://www.w3.org/ns/solid/terms#"),
    ("ldp", "http://www.w3.org/ns/ldp#"),
    ("dct", "http://purl.org/dc/terms/"),
    ("as", "https://www.w3.org/ns/activitystreams#"),
    ("meeting", "http://www.w3.org/ns/pim/meeting#"),
];

/// Registrations written into an empty registry: (index, class, container under root).
const DEFAULTS: &[(IndexType, &str, &str)] = &[
    (IndexType::Public, "vcard:AddressBook", "contacts/"),
    (IndexType::Public, "vcard:Group", "groups/"),
    (IndexType::Private, "foaf:Person", "profile/"),
    (IndexType::Private, "schema:DigitalDocument", "documents/"),
];

/// Expand a class alias to its full identifier.
///
/// Identifiers that are already qualified pass through unchanged; an
/// unknown prefix is an error.
pub fn expand_class(name: &str) -> Result<String, CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::new(ErrorKind::MissingArgument, "Class name is required"));
    }
    if QUALIFIED_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return Ok(name.to_string());
    }
    let Some((prefix, local)) = name.split_once(':') else {
        return Err(CommandError::new(
            ErrorKind::InvalidArgument,
            format!("Class must be prefixed (e.g. vcard:Individual): {name}"),
        ));
    };
    if local.is_empty() {
        return Err(CommandError::new(
            ErrorKind::InvalidArgument,
            format!("Class has no local name: {name}"),
        ));
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == prefix)
        .map(|(_, namespace)| format!("{namespace}{local}"))
        .ok_or_else(|| {
            CommandError::new(
                ErrorKind::InvalidArgument,
                format!("Unknown class prefix '{prefix}' in {name}"),
            )
        })
}

/// Every registered location for one class, across both index types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Locations {
    pub instances: Vec<String>,
    pub containers: Vec<String>,
}

pub struct TypeRegistry {
    store: Store,
    root: String,
    bootstrapped: AtomicBool,
}

impl TypeRegistry {
    pub fn new(store: Store, root: &str) -> Self {
        TypeRegistry {
            store,
            root: root.to_string(),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// Seed the default registrations if the registry table is empty.
    ///
    /// Runs at most once per registry; returns whether anything was written.
    pub fn ensure_defaults(&self) -> Result<bool, CommandError> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let rows = DEFAULTS
            .iter()
            .map(|(index_type, class, container)| {
                Ok(TypeRegistration {
                    for_class: expand_class(class)?,
                    index_type: *index_type,
                    instance: None,
                    instance_container: Some(format!("{}{container}", self.root)),
                })
            })
            .collect::<Result<Vec<_>, CommandError>>()?;
        let seeded = self.store.seed_if_empty(rows)?;
        if seeded {
            info!(count = DEFAULTS.len(), "seeded default type registrations");
        }
        Ok(seeded)
    }

    /// Create or overwrite the registration for `(index_type, for_class)`.
    pub fn register(
        &self,
        for_class: &str,
        index_type: IndexType,
        instances: Vec<String>,
        instance_container: Option<String>,
    ) -> Result<TypeRegistration, CommandError> {
        self.ensure_defaults()?;
        let for_class = expand_class(for_class)?;
        for url in &instances {
            check_instance(url)?;
        }
        if let Some(container) = &instance_container {
            if !is_container(container) {
                return Err(CommandError::new(
                    ErrorKind::InvalidArgument,
                    format!("Instance container must end with '/': {container}"),
                ));
            }
        }
        let registration = TypeRegistration {
            for_class,
            index_type,
            instance: Instances::from_vec(dedup(instances)),
            instance_container,
        };
        if registration.instance.is_none() && registration.instance_container.is_none() {
            return Err(CommandError::new(
                ErrorKind::MissingArgument,
                "A registration needs an instance or an instance container",
            ));
        }
        self.store.put(registration.clone())?;
        debug!(class = %registration.for_class, %index_type, "registered type");
        Ok(registration)
    }

    /// Remove the registration from one index type, or from both when `None`.
    pub fn unregister(
        &self,
        for_class: &str,
        index_type: Option<IndexType>,
    ) -> Result<bool, CommandError> {
        self.ensure_defaults()?;
        let for_class = expand_class(for_class)?;
        let targets: &[IndexType] = match &index_type {
            Some(t) => std::slice::from_ref(t),
            None => &IndexType::BOTH,
        };
        let mut removed = false;
        for t in targets {
            removed |= self
                .store
                .delete::<TypeRegistration>(&TypeRegistration::row_key(*t, &for_class));
        }
        debug!(class = %for_class, removed, "unregistered type");
        Ok(removed)
    }

    /// Add one instance locator, creating the registration if needed.
    pub fn add_instance(
        &self,
        for_class: &str,
        index_type: IndexType,
        url: &str,
    ) -> Result<TypeRegistration, CommandError> {
        self.ensure_defaults()?;
        let for_class = expand_class(for_class)?;
        check_instance(url)?;
        let key = TypeRegistration::row_key(index_type, &for_class);
        let mut registration = self
            .store
            .get::<TypeRegistration>(&key)
            .unwrap_or(TypeRegistration {
                for_class,
                index_type,
                instance: None,
                instance_container: None,
            });
        let mut urls = registration.instances();
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
        registration.instance = Instances::from_vec(urls);
        self.store.put(registration.clone())?;
        Ok(registration)
    }

    /// Remove one instance locator; returns whether it was registered.
    ///
    /// A registration left with neither instances nor a container is deleted.
    pub fn remove_instance(
        &self,
        for_class: &str,
        index_type: IndexType,
        url: &str,
    ) -> Result<bool, CommandError> {
        self.ensure_defaults()?;
        let for_class = expand_class(for_class)?;
        let key = TypeRegistration::row_key(index_type, &for_class);
        let Some(mut registration) = self.store.get::<TypeRegistration>(&key) else {
            return Ok(false);
        };
        let mut urls = registration.instances();
        let before = urls.len();
        urls.retain(|u| u != url);
        if urls.len() == before {
            return Ok(false);
        }
        registration.instance = Instances::from_vec(urls);
        if registration.instance.is_none() && registration.instance_container.is_none() {
            self.store.delete::<TypeRegistration>(&key);
        } else {
            self.store.put(registration)?;
        }
        Ok(true)
    }

    pub fn list_all(&self) -> Result<Vec<TypeRegistration>, CommandError> {
        self.ensure_defaults()?;
        Ok(self.store.all::<TypeRegistration>())
    }

    pub fn list_by_index_type(
        &self,
        index_type: IndexType,
    ) -> Result<Vec<TypeRegistration>, CommandError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.index_type == index_type)
            .collect())
    }

    pub fn find_by_class(&self, for_class: &str) -> Result<Vec<TypeRegistration>, CommandError> {
        let for_class = expand_class(for_class)?;
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.for_class == for_class)
            .collect())
    }

    /// Aggregate instances and containers for a class over both index types.
    pub fn locations_for(&self, for_class: &str) -> Result<Locations, CommandError> {
        let mut locations = Locations::default();
        for registration in self.find_by_class(for_class)? {
            for url in registration.instances() {
                if !locations.instances.contains(&url) {
                    locations.instances.push(url);
                }
            }
            if let Some(container) = registration.instance_container {
                if !locations.containers.contains(&container) {
                    locations.containers.push(container);
                }
            }
        }
        Ok(locations)
    }
}

fn check_instance(url: &str) -> Result<(), CommandError> {
    if !url.contains("://") {
        return Err(CommandError::new(
            ErrorKind::InvalidArgument,
            format!("Instance must be an absolute locator: {url}"),
        ));
    }
    Ok(())
}

fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://pod.example/";
    const INDIVIDUAL: &str = "http://www.w3.org/2006/vcard/ns#Individual";

    fn registry() -> TypeRegistry {
        TypeRegistry::new(Store::new(), ROOT)
    }

    #[test]
    fn test_expand_class() {
        assert_eq!(expand_class("vcard:Individual").unwrap(), INDIVIDUAL);
        assert_eq!(expand_class(INDIVIDUAL).unwrap(), INDIVIDUAL);
        assert_eq!(expand_class("nope:Thing").unwrap_err().code, ErrorKind::InvalidArgument);
        assert_eq!(expand_class("Thing").unwrap_err().code, ErrorKind::InvalidArgument);
        assert_eq!(expand_class("vcard:").unwrap_err().code, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_defaults_seeded_once() {
        let reg = registry();
        assert_eq!(reg.list_all().unwrap().len(), DEFAULTS.len());
        assert!(reg.unregister("vcard:Group", None).unwrap());
        assert_eq!(reg.list_all().unwrap().len(), DEFAULTS.len() - 1);
    }

    #[test]
    fn test_defaults_skipped_when_table_has_rows() {
        let store = Store::new();
        let first = TypeRegistry::new(store.clone(), ROOT);
        first
            .register("vcard:Individual", IndexType::Public, vec!["https://pod.example/c/a".into()], None)
            .unwrap();

        let other = Store::new();
        other
            .put(TypeRegistration {
                for_class: INDIVIDUAL.into(),
                index_type: IndexType::Private,
                instance: None,
                instance_container: Some("https://pod.example/x/".into()),
            })
            .unwrap();
        let second = TypeRegistry::new(other, ROOT);
        assert!(!second.ensure_defaults().unwrap());
        assert_eq!(second.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_register_then_find() {
        let reg = registry();
        reg.register(
            "vcard:Individual",
            IndexType::Public,
            vec!["https://pod.example/contacts/a".into()],
            None,
        )
        .unwrap();
        let found: Vec<_> = reg
            .find_by_class("vcard:Individual")
            .unwrap()
            .into_iter()
            .filter(|r| r.index_type == IndexType::Public)
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance, Some(Instances::One("https://pod.example/contacts/a".into())));
        assert_eq!(found[0].instance_container, None);
    }

    #[test]
    fn test_register_overwrites() {
        let reg = registry();
        reg.register("vcard:Individual", IndexType::Public, vec![], Some("https://pod.example/a/".into()))
            .unwrap();
        reg.register("vcard:Individual", IndexType::Public, vec![], Some("https://pod.example/b/".into()))
            .unwrap();
        let found = reg.find_by_class("vcard:Individual").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_container.as_deref(), Some("https://pod.example/b/"));
    }

    #[test]
    fn test_register_requires_location() {
        let reg = registry();
        let err = reg.register("vcard:Individual", IndexType::Public, vec![], None).unwrap_err();
        assert_eq!(err.code, ErrorKind::MissingArgument);
    }

    #[test]
    fn test_add_instance_and_locations() {
        let reg = registry();
        reg.register(
            "vcard:Individual",
            IndexType::Public,
            vec!["https://pod.example/contacts/a".into()],
            None,
        )
        .unwrap();
        reg.add_instance("vcard:Individual", IndexType::Public, "https://pod.example/contacts/b")
            .unwrap();
        reg.add_instance("vcard:Individual", IndexType::Public, "https://pod.example/contacts/b")
            .unwrap();

        let locations = reg.locations_for("vcard:Individual").unwrap();
        assert_eq!(
            locations.instances,
            vec!["https://pod.example/contacts/a", "https://pod.example/contacts/b"]
        );
        assert!(locations.containers.is_empty());
    }

    #[test]
    fn test_remove_instance_cleanup() {
        let reg = registry();
        reg.add_instance("vcard:Individual", IndexType::Private, "https://pod.example/p/a").unwrap();
        assert!(reg.remove_instance("vcard:Individual", IndexType::Private, "https://pod.example/p/a").unwrap());
        assert!(reg.find_by_class("vcard:Individual").unwrap().is_empty());

        reg.register(
            "vcard:Individual",
            IndexType::Public,
            vec!["https://pod.example/p/a".into()],
            Some("https://pod.example/p/".into()),
        )
        .unwrap();
        assert!(reg.remove_instance("vcard:Individual", IndexType::Public, "https://pod.example/p/a").unwrap());
        let kept = reg.find_by_class("vcard:Individual").unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].instance, None);
        assert!(!reg.remove_instance("vcard:Individual", IndexType::Public, "https://pod.example/p/a").unwrap());
    }

    #[test]
    fn test_unregister_one_or_both() {
        let reg = registry();
        for t in IndexType::BOTH {
            reg.register("schema:Event", t, vec![], Some("https://pod.example/events/".into()))
                .unwrap();
        }
        assert!(reg.unregister("schema:Event", Some(IndexType::Private)).unwrap());
        assert!(!reg.unregister("schema:Event", Some(IndexType::Private)).unwrap());
        assert_eq!(reg.find_by_class("schema:Event").unwrap().len(), 1);
        assert!(reg.unregister("schema:Event", None).unwrap());
        assert!(!reg.unregister("schema:Event", None).unwrap());
    }

    #[test]
    fn test_list_by_index_type() {
        let reg = registry();
        let public = reg.list_by_index_type(IndexType::Public).unwrap();
        assert!(public.iter().all(|r| r.index_type == IndexType::Public));
        assert_eq!(public.len(), 2);
    }
}
