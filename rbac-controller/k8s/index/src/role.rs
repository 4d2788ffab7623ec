use crate::index::{Indexed, ObjectIndex, ResourceKey};
use rbac_controller_core::PolicyRule;
use rbac_controller_k8s_api::{self as k8s, ResourceExt};

/// Holds both `Role` and `ClusterRole` objects.
pub type RoleIndex = ObjectIndex<Role>;

/// The important parts of a `Role` or `ClusterRole` resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Role {
    pub key: ResourceKey,
    pub uid: String,
    pub name: String,

    /// The namespace as reported by the object's metadata.
    pub namespace: Option<String>,
    pub created_at: Option<k8s::Time>,
    pub rules: Vec<PolicyRule>,
}

// === impl Role ===

impl Role {
    pub fn is_cluster_role(&self) -> bool {
        self.key.scope.is_cluster()
    }
}

impl Indexed for Role {
    fn key(&self) -> &ResourceKey {
        &self.key
    }

    fn uid(&self) -> &str {
        &self.uid
    }
}

impl From<k8s::Role> for Role {
    fn from(role: k8s::Role) -> Self {
        let name = role.name_any();
        let namespace = role.namespace();
        Self {
            key: ResourceKey::namespaced(namespace.as_deref().unwrap_or_default(), &name),
            uid: role.uid().unwrap_or_default(),
            created_at: role.creation_timestamp(),
            rules: mk_rules(role.rules),
            name,
            namespace,
        }
    }
}

impl From<k8s::ClusterRole> for Role {
    fn from(role: k8s::ClusterRole) -> Self {
        let name = role.name_any();
        Self {
            key: ResourceKey::cluster(&name),
            uid: role.uid().unwrap_or_default(),
            namespace: role.namespace(),
            created_at: role.creation_timestamp(),
            rules: mk_rules(role.rules),
            name,
        }
    }
}

fn mk_rules(rules: Option<Vec<k8s::PolicyRule>>) -> Vec<PolicyRule> {
    rules
        .unwrap_or_default()
        .into_iter()
        .map(|rule| PolicyRule {
            api_groups: rule.api_groups.unwrap_or_default(),
            resources: rule.resources.unwrap_or_default(),
            resource_names: rule.resource_names.unwrap_or_default(),
            verbs: rule.verbs,
        })
        .collect()
}
