//! Applies watch events to a [`Store`](crate::Store) and produces [`ResourceEvent`]s describing
//! the result.
//!
//! Events for a single kind must be dispatched in arrival order. The dispatcher does not reorder
//! events; removals are guarded by UID so that a removal racing a newer upsert is ignored.
//!
//! When a binding is applied before the role it grants, its event carries an empty role ID. The
//! binding's event is not re-emitted when the role later arrives; the role ID is only reported the
//! next time the binding itself is applied (e.g. on a resync).

use crate::{
    binding::Binding,
    event::{Action, ResourceEvent},
    index::{Removal, ResourceKey},
    metrics::DispatchMetrics,
    role::Role,
    store::SharedStore,
};
use ahash::AHashSet as HashSet;
use futures::prelude::*;
use kube::runtime::watcher;
use rbac_controller_core::Scope;
use rbac_controller_k8s_api::{self as k8s, ResourceExt};
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct Dispatcher {
    store: SharedStore,
    metrics: DispatchMetrics,
}

/// Any of the four RBAC resource kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum RbacObject {
    Role(k8s::Role),
    ClusterRole(k8s::ClusterRole),
    Binding(k8s::RoleBinding),
    ClusterBinding(k8s::ClusterRoleBinding),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Role,
    ClusterRole,
    Binding,
    ClusterBinding,
}

/// A Kubernetes resource type that can be dispatched.
pub trait RbacResource: Into<RbacObject> {
    const KIND: Kind;
}

// === impl Dispatcher ===

impl Dispatcher {
    pub fn new(store: SharedStore, metrics: DispatchMetrics) -> Self {
        Self { store, metrics }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Applies a single object to the store, returning the events that describe its new state.
    ///
    /// `Remove` deletes the object; every other action upserts it. A stale removal produces no
    /// events.
    pub fn process_event(
        &self,
        object: impl Into<RbacObject>,
        action: Action,
    ) -> Vec<ResourceEvent> {
        let object = object.into();
        let kind = object.kind();
        let events = match object {
            RbacObject::Role(role) => self.process_role(kind, role.into(), action),
            RbacObject::ClusterRole(role) => self.process_role(kind, role.into(), action),
            RbacObject::Binding(binding) => self.process_binding(kind, binding.into(), action),
            RbacObject::ClusterBinding(binding) => {
                self.process_binding(kind, binding.into(), action)
            }
        };
        self.metrics.record(kind, &events);
        events
    }

    /// Applies an object reported by a watch, choosing `Create` or `Update` depending on whether an
    /// object with the same key is already stored.
    pub fn apply(&self, object: impl Into<RbacObject>) -> Vec<ResourceEvent> {
        let object = object.into();
        let key = object.key();
        let exists = if object.kind().is_role() {
            self.store.contains_role(&key)
        } else {
            self.store.contains_binding(&key)
        };
        let action = if exists {
            Action::Update
        } else {
            Action::Create
        };
        self.process_event(object, action)
    }

    /// Removes all objects of a kind whose keys are not in `live`.
    ///
    /// Called when a watch has finished listing its resources, so that objects deleted while the
    /// watch was disconnected are dropped.
    pub fn retain(&self, kind: Kind, live: &HashSet<ResourceKey>) -> Vec<ResourceEvent> {
        let events = if kind.is_role() {
            self.store
                .roles(kind.scope())
                .into_iter()
                .filter(|role| !live.contains(&role.key))
                .filter_map(|role| match self.store.delete_role(&role.key, &role.uid) {
                    Removal::Removed(_) => Some(ResourceEvent::role(&role, Action::Remove)),
                    Removal::NotFound | Removal::Stale => None,
                })
                .collect::<Vec<_>>()
        } else {
            self.store
                .bindings(kind.scope())
                .into_iter()
                .filter(|binding| !live.contains(&binding.key))
                .filter_map(
                    |binding| match self.store.delete_binding(&binding.key, &binding.uid) {
                        Removal::Removed(_) => {
                            let role_id = self.store.role_id(&binding);
                            Some(ResourceEvent::binding(&binding, role_id, Action::Remove))
                        }
                        Removal::NotFound | Removal::Stale => None,
                    },
                )
                .collect::<Vec<_>>()
        };
        if !events.is_empty() {
            tracing::debug!(%kind, removed = events.len(), "pruned objects missing from resync");
        }
        self.metrics.record(kind, &events);
        events
    }

    fn process_role(&self, kind: Kind, role: Role, action: Action) -> Vec<ResourceEvent> {
        if action == Action::Remove {
            return match self.store.delete_role(&role.key, &role.uid) {
                Removal::Stale => {
                    self.metrics.stale_removal(kind);
                    vec![]
                }
                Removal::Removed(_) | Removal::NotFound => {
                    vec![ResourceEvent::role(&role, Action::Remove)]
                }
            };
        }

        let event = ResourceEvent::role(&role, action);
        self.store.apply_role(role);
        vec![event]
    }

    fn process_binding(&self, kind: Kind, binding: Binding, action: Action) -> Vec<ResourceEvent> {
        if action == Action::Remove {
            return match self.store.delete_binding(&binding.key, &binding.uid) {
                Removal::Stale => {
                    self.metrics.stale_removal(kind);
                    vec![]
                }
                Removal::Removed(_) | Removal::NotFound => {
                    let role_id = self.store.role_id(&binding);
                    vec![ResourceEvent::binding(&binding, role_id, Action::Remove)]
                }
            };
        }

        let role_id = self.store.apply_binding(binding.clone());
        vec![ResourceEvent::binding(&binding, role_id, action)]
    }
}

/// Applies a watch stream for one resource kind, publishing the resulting events on `tx`.
///
/// Objects listed while the watch is initializing are dispatched with [`Action::Sync`]. Once the
/// listing completes, stored objects of the same kind that were not listed are removed.
pub async fn dispatch<K>(
    dispatcher: Arc<Dispatcher>,
    events: impl Stream<Item = watcher::Event<K>>,
    tx: mpsc::UnboundedSender<ResourceEvent>,
) where
    K: RbacResource,
{
    futures::pin_mut!(events);

    // Holds the keys listed since the last `Init`, while a resync is in progress.
    let mut listed: Option<HashSet<ResourceKey>> = None;

    while let Some(event) = events.next().await {
        let out = match event {
            watcher::Event::Apply(object) => dispatcher.apply(object),
            watcher::Event::Delete(object) => dispatcher.process_event(object, Action::Remove),
            watcher::Event::Init => {
                tracing::debug!(kind = %K::KIND, "resyncing");
                listed = Some(HashSet::default());
                continue;
            }
            watcher::Event::InitApply(object) => {
                let object = object.into();
                if let Some(keys) = listed.as_mut() {
                    keys.insert(object.key());
                }
                dispatcher.process_event(object, Action::Sync)
            }
            watcher::Event::InitDone => match listed.take() {
                Some(keys) => dispatcher.retain(K::KIND, &keys),
                None => continue,
            },
        };

        // The store is kept current after the receiver goes away; events are simply dropped.
        if tx.is_closed() {
            continue;
        }
        for event in out {
            if tx.send(event).is_err() {
                tracing::error!(kind = %K::KIND, "resource event receiver dropped");
                break;
            }
        }
    }
}

// === impl RbacObject ===

impl RbacObject {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Role(_) => Kind::Role,
            Self::ClusterRole(_) => Kind::ClusterRole,
            Self::Binding(_) => Kind::Binding,
            Self::ClusterBinding(_) => Kind::ClusterBinding,
        }
    }

    /// The key under which the object is stored.
    pub fn key(&self) -> ResourceKey {
        let (namespace, name) = match self {
            Self::Role(r) => (r.namespace(), r.name_any()),
            Self::ClusterRole(r) => (r.namespace(), r.name_any()),
            Self::Binding(b) => (b.namespace(), b.name_any()),
            Self::ClusterBinding(b) => (b.namespace(), b.name_any()),
        };
        ResourceKey::new(self.kind().scope(), namespace.unwrap_or_default(), name)
    }
}

impl From<k8s::Role> for RbacObject {
    fn from(role: k8s::Role) -> Self {
        Self::Role(role)
    }
}

impl From<k8s::ClusterRole> for RbacObject {
    fn from(role: k8s::ClusterRole) -> Self {
        Self::ClusterRole(role)
    }
}

impl From<k8s::RoleBinding> for RbacObject {
    fn from(binding: k8s::RoleBinding) -> Self {
        Self::Binding(binding)
    }
}

impl From<k8s::ClusterRoleBinding> for RbacObject {
    fn from(binding: k8s::ClusterRoleBinding) -> Self {
        Self::ClusterBinding(binding)
    }
}

impl RbacResource for k8s::Role {
    const KIND: Kind = Kind::Role;
}

impl RbacResource for k8s::ClusterRole {
    const KIND: Kind = Kind::ClusterRole;
}

impl RbacResource for k8s::RoleBinding {
    const KIND: Kind = Kind::Binding;
}

impl RbacResource for k8s::ClusterRoleBinding {
    const KIND: Kind = Kind::ClusterBinding;
}

// === impl Kind ===

impl Kind {
    pub fn is_role(&self) -> bool {
        matches!(self, Self::Role | Self::ClusterRole)
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::Role | Self::Binding => Scope::Namespace,
            Self::ClusterRole | Self::ClusterBinding => Scope::Cluster,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::Binding => "RoleBinding",
            Self::ClusterBinding => "ClusterRoleBinding",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
