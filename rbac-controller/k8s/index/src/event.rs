//! Notifications describing an RBAC object after it has been applied to the store.

use crate::{binding::Binding, role::Role};
use rbac_controller_core::{PolicyRule, Subject};
use rbac_controller_k8s_api as k8s;
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Remove,

    /// The object was listed while the watch was being (re)initialized.
    Sync,
}

/// Describes the state of a role or binding after a mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceEvent {
    pub id: String,
    pub action: Action,
    pub resource: Resource,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Role(RoleEvent),
    Binding(BindingEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoleEvent {
    pub id: String,
    pub name: String,
    pub namespace: Option<String>,
    pub cluster_role: bool,
    pub created_at: Option<k8s::Time>,
    pub rules: Vec<PolicyRule>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindingEvent {
    pub id: String,
    pub name: String,
    pub namespace: Option<String>,

    /// Whether the binding grants a `ClusterRole`.
    pub cluster_role: bool,

    /// The UID of the granted role, or empty if the role was not known when the event was
    /// produced.
    pub role_id: String,
    pub created_at: Option<k8s::Time>,
    pub subjects: Vec<Subject>,
}

// === impl Action ===

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Remove => "REMOVE",
            Self::Sync => "SYNC",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ResourceEvent ===

impl ResourceEvent {
    pub(crate) fn role(role: &Role, action: Action) -> Self {
        Self {
            id: role.uid.clone(),
            action,
            resource: Resource::Role(RoleEvent {
                id: role.uid.clone(),
                name: role.name.clone(),
                namespace: role.namespace.clone(),
                cluster_role: role.is_cluster_role(),
                created_at: role.created_at.clone(),
                rules: role.rules.clone(),
            }),
        }
    }

    pub(crate) fn binding(binding: &Binding, role_id: String, action: Action) -> Self {
        Self {
            id: binding.uid.clone(),
            action,
            resource: Resource::Binding(BindingEvent {
                id: binding.uid.clone(),
                name: binding.name.clone(),
                namespace: binding.namespace.clone(),
                cluster_role: binding.grants_cluster_role(),
                role_id,
                created_at: binding.created_at.clone(),
                subjects: binding.subjects.clone(),
            }),
        }
    }

    pub fn as_role(&self) -> Option<&RoleEvent> {
        match &self.resource {
            Resource::Role(role) => Some(role),
            Resource::Binding(_) => None,
        }
    }

    pub fn as_binding(&self) -> Option<&BindingEvent> {
        match &self.resource {
            Resource::Binding(binding) => Some(binding),
            Resource::Role(_) => None,
        }
    }
}
