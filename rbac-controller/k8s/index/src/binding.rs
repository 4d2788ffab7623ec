use crate::index::{Indexed, ObjectIndex, Removal, ResourceKey, Upsert, Versioned};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use rbac_controller_core::{Scope, ServiceAccountRef, Subject};
use rbac_controller_k8s_api::{self as k8s, ResourceExt};
use std::hash::Hash;

/// The important parts of a `RoleBinding` or `ClusterRoleBinding` resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub key: ResourceKey,
    pub uid: String,
    pub name: String,

    /// The namespace as reported by the object's metadata.
    pub namespace: Option<String>,
    pub created_at: Option<k8s::Time>,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

/// A binding's reference to the role it grants.
///
/// Whether the reference names a `Role` or a `ClusterRole` is determined by the reference itself,
/// not by looking up the name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoleRef {
    pub name: String,
    pub scope: Scope,
}

/// Holds both `RoleBinding` and `ClusterRoleBinding` objects, along with the reverse mappings
/// needed to resolve the bindings that apply to a service account or that grant a role.
#[derive(Debug, Default)]
pub struct BindingIndex {
    bindings: ObjectIndex<Binding>,
    by_service_account: HashMap<ServiceAccountRef, HashSet<ResourceKey>>,
    by_role: HashMap<ResourceKey, HashSet<ResourceKey>>,
    by_uid: HashMap<String, HashSet<ResourceKey>>,
}

// === impl Binding ===

impl Binding {
    /// Whether the binding grants a `ClusterRole`.
    pub fn grants_cluster_role(&self) -> bool {
        self.role_ref.scope.is_cluster()
    }

    /// The key of the role granted by this binding.
    ///
    /// A namespaced binding may grant a `Role` in its own namespace or a `ClusterRole`; a cluster
    /// binding may only grant a `ClusterRole`.
    pub fn role_key(&self) -> ResourceKey {
        match self.role_ref.scope {
            Scope::Cluster => ResourceKey::cluster(&self.role_ref.name),
            Scope::Namespace => ResourceKey::namespaced(&self.key.namespace, &self.role_ref.name),
        }
    }

    pub fn service_accounts(&self) -> impl Iterator<Item = ServiceAccountRef> + '_ {
        self.subjects.iter().filter_map(Subject::service_account)
    }
}

impl Indexed for Binding {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn uid(&self) -> &str {
        &self.uid
    }
}

impl From<k8s::RoleBinding> for Binding {
    fn from(binding: k8s::RoleBinding) -> Self {
        let name = binding.name_any();
        let namespace = binding.namespace();
        let scope = if binding.role_ref.kind == k8s::CLUSTER_ROLE_KIND {
            Scope::Cluster
        } else {
            Scope::Namespace
        };
        Self {
            key: ResourceKey::namespaced(namespace.as_deref().unwrap_or_default(), &name),
            uid: binding.uid().unwrap_or_default(),
            created_at: binding.creation_timestamp(),
            role_ref: RoleRef {
                name: binding.role_ref.name,
                scope,
            },
            subjects: mk_subjects(binding.subjects),
            name,
            namespace,
        }
    }
}

impl From<k8s::ClusterRoleBinding> for Binding {
    fn from(binding: k8s::ClusterRoleBinding) -> Self {
        let name = binding.name_any();
        Self {
            key: ResourceKey::cluster(&name),
            uid: binding.uid().unwrap_or_default(),
            namespace: binding.namespace(),
            created_at: binding.creation_timestamp(),
            // Cluster bindings can only reference cluster roles.
            role_ref: RoleRef {
                name: binding.role_ref.name,
                scope: Scope::Cluster,
            },
            subjects: mk_subjects(binding.subjects),
            name,
        }
    }
}

fn mk_subjects(subjects: Option<Vec<k8s::Subject>>) -> Vec<Subject> {
    subjects
        .unwrap_or_default()
        .into_iter()
        .map(|s| Subject {
            kind: s.kind,
            name: s.name,
            namespace: s.namespace.unwrap_or_default(),
        })
        .collect()
}

// === impl BindingIndex ===

impl BindingIndex {
    pub fn upsert(&mut self, binding: Binding) -> Upsert<Binding> {
        let key = binding.key.clone();
        let upsert = self.bindings.upsert(binding);
        if upsert == Upsert::Unchanged {
            return upsert;
        }
        if let Upsert::Updated(prior) = &upsert {
            self.unlink(prior);
        }
        if let Some(binding) = self.bindings.get(&key).map(|b| b.object().clone()) {
            self.link(&binding);
        }
        upsert
    }

    pub fn remove(&mut self, key: &ResourceKey, uid: &str) -> Removal<Binding> {
        let removal = self.bindings.remove(key, uid);
        if let Removal::Removed(binding) = &removal {
            self.unlink(binding);
        }
        removal
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Versioned<Binding>> {
        self.bindings.get(key)
    }

    pub fn contains_key(&self, key: &ResourceKey) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Versioned<Binding>> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn count(&self, scope: Scope) -> usize {
        self.bindings.count(scope)
    }

    /// Iterates over the bindings that name the given service account as a subject.
    pub fn for_service_account<'a>(
        &'a self,
        sa: &ServiceAccountRef,
    ) -> impl Iterator<Item = &'a Versioned<Binding>> + 'a {
        self.lookup(self.by_service_account.get(sa))
    }

    /// Iterates over the bindings that grant the given role.
    pub fn for_role<'a>(
        &'a self,
        role: &ResourceKey,
    ) -> impl Iterator<Item = &'a Versioned<Binding>> + 'a {
        self.lookup(self.by_role.get(role))
    }

    /// Iterates over the bindings with the given UID.
    ///
    /// UIDs are unique within a cluster, but more than one binding may be returned while an
    /// object is being replaced.
    pub fn for_uid<'a>(&'a self, uid: &str) -> impl Iterator<Item = &'a Versioned<Binding>> + 'a {
        self.lookup(self.by_uid.get(uid))
    }

    fn lookup<'a>(
        &'a self,
        keys: Option<&'a HashSet<ResourceKey>>,
    ) -> impl Iterator<Item = &'a Versioned<Binding>> + 'a {
        keys.into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(move |key| self.bindings.get(key))
    }

    fn link(&mut self, binding: &Binding) {
        for sa in binding.service_accounts() {
            self.by_service_account
                .entry(sa)
                .or_default()
                .insert(binding.key.clone());
        }
        self.by_role
            .entry(binding.role_key())
            .or_default()
            .insert(binding.key.clone());
        if !binding.uid.is_empty() {
            self.by_uid
                .entry(binding.uid.clone())
                .or_default()
                .insert(binding.key.clone());
        }
    }

    fn unlink(&mut self, binding: &Binding) {
        for sa in binding.service_accounts() {
            remove_from(&mut self.by_service_account, &sa, &binding.key);
        }
        remove_from(&mut self.by_role, &binding.role_key(), &binding.key);
        remove_from(&mut self.by_uid, &binding.uid, &binding.key);
    }
}

/// Removes a binding key from a reverse mapping, dropping the entry once it is empty.
fn remove_from<K: Eq + Hash>(
    map: &mut HashMap<K, HashSet<ResourceKey>>,
    entry: &K,
    binding: &ResourceKey,
) {
    if let Some(keys) = map.get_mut(entry) {
        keys.remove(binding);
        if keys.is_empty() {
            map.remove(entry);
        }
    }
}
