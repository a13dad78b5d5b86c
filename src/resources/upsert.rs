//! Name-keyed upserts over Kubernetes object lists
//!
//! Containers, volumes, env vars, mounts and claim templates are ordered lists
//! on the wire but behave like maps keyed by name. `NamedList` gives them map
//! semantics while keeping the original order: replacing an entry keeps its
//! position, new entries are appended.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, PersistentVolumeClaim, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Objects identified by a name within their list
pub trait Named {
    fn key(&self) -> &str;
}

impl Named for Container {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Named for Volume {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Named for VolumeMount {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Named for EnvVar {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Named for PersistentVolumeClaim {
    fn key(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Ordered, name-keyed view over a Kubernetes list field
#[derive(Clone, Debug, PartialEq)]
pub struct NamedList<T> {
    items: Vec<T>,
    /// Whether the source field was present, so an untouched `Some(vec![])`
    /// serializes back the same way
    present: bool,
}

impl<T: Named> NamedList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            present: true,
        }
    }

    pub fn from_option(items: Option<Vec<T>>) -> Self {
        match items {
            Some(items) => Self::new(items),
            None => Self {
                items: Vec::new(),
                present: false,
            },
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.position(key).map(|i| &self.items[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the entry with the same name in place, or append it
    pub fn upsert(&mut self, item: T) {
        match self.position(item.key()) {
            Some(i) => self.items[i] = item,
            None => self.items.push(item),
        }
    }

    /// Mutable access to the entry named `key`, appending `init()` first if absent
    ///
    /// Used for field-level merges where fields not set by the caller must survive.
    pub fn get_or_insert_with<F>(&mut self, key: &str, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        let index = match self.position(key) {
            Some(i) => i,
            None => {
                self.items.push(init());
                self.items.len() - 1
            }
        };
        &mut self.items[index]
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Back to an optional list field; `None` only if it was absent and is still empty
    pub fn into_option(self) -> Option<Vec<T>> {
        if self.items.is_empty() && !self.present {
            None
        } else {
            Some(self.items)
        }
    }
}

/// Upsert every item into an optional list field
pub fn upsert_all<T, I>(target: &mut Option<Vec<T>>, items: I)
where
    T: Named,
    I: IntoIterator<Item = T>,
{
    let mut list = NamedList::from_option(target.take());
    for item in items {
        list.upsert(item);
    }
    *target = list.into_option();
}

/// Merge `entries` into an optional string map, keeping keys set by others
pub fn upsert_map(
    target: &mut Option<BTreeMap<String, String>>,
    entries: &BTreeMap<String, String>,
) {
    if entries.is_empty() {
        return;
    }
    target
        .get_or_insert_with(BTreeMap::new)
        .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Ensure `owner` is listed exactly once, matched by UID
pub fn upsert_owner_reference(target: &mut Option<Vec<OwnerReference>>, owner: OwnerReference) {
    let refs = target.get_or_insert_with(Vec::new);
    match refs.iter().position(|r| r.uid == owner.uid) {
        Some(i) => refs[i] = owner,
        None => refs.push(owner),
    }
}
