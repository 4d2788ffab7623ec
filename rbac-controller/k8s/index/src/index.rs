//! A generic index of RBAC objects keyed by scope, namespace, and name.
//!
//! Roles and cluster roles share one index, as do role bindings and cluster role bindings. The
//! scope is part of the key, so a `Role` and a `ClusterRole` may share a name without conflict.

use ahash::AHashMap as HashMap;
use rbac_controller_core::Scope;
use std::{collections::hash_map::Entry, fmt, sync::Arc};

/// Identifies an RBAC object. Cluster-scoped objects always have an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub scope: Scope,
    pub namespace: String,
    pub name: String,
}

/// An object that can be stored in an [`ObjectIndex`].
pub trait Indexed: PartialEq {
    fn key(&self) -> &ResourceKey;

    /// The source-assigned identity of this generation of the object.
    fn uid(&self) -> &str;
}

#[derive(Debug)]
pub struct ObjectIndex<T> {
    by_key: HashMap<ResourceKey, Versioned<T>>,
    next_revision: u64,
}

/// An indexed object tagged with the revision at which it was stored.
///
/// Revisions increase monotonically across all objects in an index, so a replaced object always
/// has a greater revision than the object it replaced.
#[derive(Debug)]
pub struct Versioned<T> {
    revision: u64,
    object: Arc<T>,
}

/// The outcome of an upsert.
#[derive(Debug, PartialEq)]
pub enum Upsert<T> {
    Created,
    Updated(Arc<T>),
    Unchanged,
}

/// The outcome of a removal.
#[derive(Debug, PartialEq)]
pub enum Removal<T> {
    Removed(Arc<T>),
    NotFound,
    /// The stored object has a different UID than the one being removed, so the removal refers to
    /// an older generation and is ignored.
    Stale,
}

// === impl ResourceKey ===

impl ResourceKey {
    pub fn namespaced(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            scope: Scope::Namespace,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn cluster(name: impl ToString) -> Self {
        Self {
            scope: Scope::Cluster,
            namespace: String::new(),
            name: name.to_string(),
        }
    }

    pub fn new(scope: Scope, namespace: impl ToString, name: impl ToString) -> Self {
        match scope {
            Scope::Cluster => Self::cluster(name),
            Scope::Namespace => Self::namespaced(namespace, name),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Cluster => self.name.fmt(f),
            Scope::Namespace => write!(f, "{}/{}", self.namespace, self.name),
        }
    }
}

// === impl ObjectIndex ===

impl<T> Default for ObjectIndex<T> {
    fn default() -> Self {
        Self {
            by_key: HashMap::default(),
            next_revision: 1,
        }
    }
}

impl<T: Indexed> ObjectIndex<T> {
    /// Stores an object, replacing any object with the same key.
    ///
    /// The revision is only advanced when the stored object actually changes.
    pub fn upsert(&mut self, object: T) -> Upsert<T> {
        let revision = self.next_revision;
        match self.by_key.entry(object.key().clone()) {
            Entry::Vacant(entry) => {
                entry.insert(Versioned::new(revision, object));
            }
            Entry::Occupied(mut entry) => {
                if *entry.get().object == object {
                    return Upsert::Unchanged;
                }
                let prior = entry.insert(Versioned::new(revision, object));
                self.next_revision += 1;
                return Upsert::Updated(prior.object);
            }
        }
        self.next_revision += 1;
        Upsert::Created
    }

    /// Removes the object with the given key unless the stored object has a different UID.
    pub fn remove(&mut self, key: &ResourceKey, uid: &str) -> Removal<T> {
        match self.by_key.entry(key.clone()) {
            Entry::Vacant(_) => Removal::NotFound,
            Entry::Occupied(entry) => {
                if entry.get().object.uid() != uid {
                    return Removal::Stale;
                }
                Removal::Removed(entry.remove().object)
            }
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Versioned<T>> {
        self.by_key.get(key)
    }

    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Versioned<T>> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Counts the objects stored at the given scope.
    pub fn count(&self, scope: Scope) -> usize {
        self.by_key.keys().filter(|k| k.scope == scope).count()
    }
}

// === impl Versioned ===

impl<T> Versioned<T> {
    fn new(revision: u64, object: T) -> Self {
        Self {
            revision,
            object: Arc::new(object),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn object(&self) -> &Arc<T> {
        &self.object
    }
}
