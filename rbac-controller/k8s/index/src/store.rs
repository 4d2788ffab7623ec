use crate::{
    binding::{Binding, BindingIndex},
    cache::EvaluationCache,
    index::{Removal, ResourceKey, Upsert},
    resolve,
    role::{Role, RoleIndex},
};
use ahash::AHashSet as HashSet;
use parking_lot::{Mutex, RwLock};
use rbac_controller_core::{Classifier, PermissionLevel, Scope, ServiceAccountRef};
use rbac_controller_k8s_api::{self as k8s, ResourceExt};
use std::{collections::BTreeSet, sync::Arc};

pub type SharedStore = Arc<Store>;

/// Holds all RBAC indexing state and answers permission queries.
///
/// Mutations take the index's write lock; queries take its read lock, so lookups proceed
/// concurrently while mutations are serialized. Every mutation method is total: malformed objects
/// are stored as-is and simply contribute nothing when classified.
#[derive(Debug)]
pub struct Store {
    classifier: Classifier,
    index: RwLock<Index>,
    cache: Mutex<EvaluationCache>,
}

#[derive(Debug, Default)]
struct Index {
    roles: RoleIndex,
    bindings: BindingIndex,
}

/// The number of objects held by a store.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSizes {
    pub roles: usize,
    pub cluster_roles: usize,
    pub bindings: usize,
    pub cluster_bindings: usize,
    pub cached_levels: usize,
}

// === impl Store ===

impl Store {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            index: RwLock::new(Index::default()),
            cache: Mutex::new(EvaluationCache::default()),
        }
    }

    pub fn shared(classifier: Classifier) -> SharedStore {
        Arc::new(Self::new(classifier))
    }

    pub fn upsert_role(&self, role: k8s::Role) {
        self.apply_role(role.into());
    }

    pub fn remove_role(&self, role: &k8s::Role) {
        let key = ResourceKey::namespaced(role.namespace().unwrap_or_default(), role.name_any());
        self.delete_role(&key, &role.uid().unwrap_or_default());
    }

    pub fn upsert_cluster_role(&self, role: k8s::ClusterRole) {
        self.apply_role(role.into());
    }

    pub fn remove_cluster_role(&self, role: &k8s::ClusterRole) {
        let key = ResourceKey::cluster(role.name_any());
        self.delete_role(&key, &role.uid().unwrap_or_default());
    }

    pub fn upsert_binding(&self, binding: k8s::RoleBinding) {
        self.apply_binding(binding.into());
    }

    pub fn remove_binding(&self, binding: &k8s::RoleBinding) {
        let key = ResourceKey::namespaced(
            binding.namespace().unwrap_or_default(),
            binding.name_any(),
        );
        self.delete_binding(&key, &binding.uid().unwrap_or_default());
    }

    pub fn upsert_cluster_binding(&self, binding: k8s::ClusterRoleBinding) {
        self.apply_binding(binding.into());
    }

    pub fn remove_cluster_binding(&self, binding: &k8s::ClusterRoleBinding) {
        let key = ResourceKey::cluster(binding.name_any());
        self.delete_binding(&key, &binding.uid().unwrap_or_default());
    }

    /// Returns the highest permission level granted to a workload's service account.
    pub fn permission_level_for_deployment(&self, sa: &ServiceAccountRef) -> PermissionLevel {
        // The read lock is held until the computed level is cached. Mutations invalidate the cache
        // while holding the write lock, so a level computed from a prior state is never cached
        // after the invalidation that supersedes it.
        let index = self.index.read();
        if let Some(level) = self.cache.lock().get(sa) {
            return level;
        }

        let rule_sets = resolve::rule_sets_for(&index.roles, &index.bindings, sa);
        let level = resolve::permission_level(&self.classifier, &rule_sets);
        tracing::trace!(%sa, %level, rule_sets = rule_sets.len(), "computed permission level");
        self.cache.lock().insert(sa, level);
        level
    }

    /// Returns the service accounts bound to a namespaced `Role`.
    pub fn find_subjects_for_role(&self, namespace: &str, role: &str) -> Vec<ServiceAccountRef> {
        let index = self.index.read();
        let key = ResourceKey::namespaced(namespace, role);
        service_accounts(index.bindings.for_role(&key).map(|b| b.object().as_ref()))
    }

    /// Returns the service accounts named by the `RoleBinding` with the given UID.
    pub fn find_subjects_for_binding_id(
        &self,
        namespace: &str,
        binding_id: &str,
    ) -> Vec<ServiceAccountRef> {
        let index = self.index.read();
        service_accounts(
            index
                .bindings
                .for_uid(binding_id)
                .map(|b| b.object().as_ref())
                .filter(|b| b.key.scope == Scope::Namespace && b.key.namespace == namespace),
        )
    }

    pub fn sizes(&self) -> StoreSizes {
        let index = self.index.read();
        StoreSizes {
            roles: index.roles.count(Scope::Namespace),
            cluster_roles: index.roles.count(Scope::Cluster),
            bindings: index.bindings.count(Scope::Namespace),
            cluster_bindings: index.bindings.count(Scope::Cluster),
            cached_levels: self.cache.lock().len(),
        }
    }

    pub(crate) fn apply_role(&self, role: Role) {
        let key = role.key.clone();
        let mut index = self.index.write();
        match index.roles.upsert(role) {
            Upsert::Unchanged => {
                tracing::debug!(role = %key, "no changes");
                return;
            }
            Upsert::Created => tracing::debug!(role = %key, "created"),
            Upsert::Updated(_) => tracing::debug!(role = %key, "updated"),
        }
        self.invalidate_role(&index, &key);
    }

    pub(crate) fn delete_role(&self, key: &ResourceKey, uid: &str) -> Removal<Role> {
        let mut index = self.index.write();
        let removal = index.roles.remove(key, uid);
        match &removal {
            Removal::Removed(_) => {
                tracing::debug!(role = %key, "removed");
                self.invalidate_role(&index, key);
            }
            Removal::Stale => tracing::debug!(role = %key, %uid, "ignoring stale removal"),
            Removal::NotFound => tracing::debug!(role = %key, "not found"),
        }
        removal
    }

    /// Indexes a binding, returning the UID of the role it grants or an empty string if the role
    /// does not exist.
    pub(crate) fn apply_binding(&self, binding: Binding) -> String {
        let key = binding.key.clone();
        let role_key = binding.role_key();
        let mut namespaces = subject_namespaces(&binding);

        let mut index = self.index.write();
        match index.bindings.upsert(binding) {
            Upsert::Unchanged => {
                tracing::debug!(binding = %key, "no changes");
                return role_id(&index.roles, &role_key);
            }
            Upsert::Created => tracing::debug!(binding = %key, "created"),
            Upsert::Updated(prior) => {
                tracing::debug!(binding = %key, "updated");
                namespaces.extend(subject_namespaces(&prior));
            }
        }
        self.cache.lock().invalidate(namespaces.iter());
        role_id(&index.roles, &role_key)
    }

    pub(crate) fn delete_binding(&self, key: &ResourceKey, uid: &str) -> Removal<Binding> {
        let mut index = self.index.write();
        let removal = index.bindings.remove(key, uid);
        match &removal {
            Removal::Removed(binding) => {
                tracing::debug!(binding = %key, "removed");
                self.cache
                    .lock()
                    .invalidate(subject_namespaces(binding).iter());
            }
            Removal::Stale => tracing::debug!(binding = %key, %uid, "ignoring stale removal"),
            Removal::NotFound => tracing::debug!(binding = %key, "not found"),
        }
        removal
    }

    /// Returns the UID of the role currently granted by a binding, or an empty string if the role
    /// does not exist.
    pub(crate) fn role_id(&self, binding: &Binding) -> String {
        role_id(&self.index.read().roles, &binding.role_key())
    }

    pub(crate) fn contains_role(&self, key: &ResourceKey) -> bool {
        self.index.read().roles.contains_key(key)
    }

    pub(crate) fn contains_binding(&self, key: &ResourceKey) -> bool {
        self.index.read().bindings.contains_key(key)
    }

    pub(crate) fn roles(&self, scope: Scope) -> Vec<Arc<Role>> {
        self.index
            .read()
            .roles
            .iter()
            .map(|r| r.object())
            .filter(|r| r.key.scope == scope)
            .cloned()
            .collect()
    }

    pub(crate) fn bindings(&self, scope: Scope) -> Vec<Arc<Binding>> {
        self.index
            .read()
            .bindings
            .iter()
            .map(|b| b.object())
            .filter(|b| b.key.scope == scope)
            .cloned()
            .collect()
    }

    /// Drops cached levels that may depend on a role.
    ///
    /// A cluster role may be granted by any binding, so the whole cache is cleared. A namespaced
    /// role may only be granted by bindings in its namespace, but those bindings may name service
    /// accounts in other namespaces.
    fn invalidate_role(&self, index: &Index, key: &ResourceKey) {
        let mut cache = self.cache.lock();
        match key.scope {
            Scope::Cluster => cache.clear(),
            Scope::Namespace => {
                let namespaces = index
                    .bindings
                    .for_role(key)
                    .flat_map(|b| b.object().service_accounts())
                    .map(|sa| sa.namespace)
                    .collect::<HashSet<_>>();
                cache.invalidate(namespaces.iter());
            }
        }
    }
}

fn role_id(roles: &RoleIndex, key: &ResourceKey) -> String {
    roles
        .get(key)
        .map(|r| r.object().uid.clone())
        .unwrap_or_default()
}

fn subject_namespaces(binding: &Binding) -> HashSet<String> {
    binding.service_accounts().map(|sa| sa.namespace).collect()
}

fn service_accounts<'b>(bindings: impl Iterator<Item = &'b Binding>) -> Vec<ServiceAccountRef> {
    bindings
        .flat_map(|b| b.service_accounts())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
