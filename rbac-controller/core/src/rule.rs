/// Matches every verb, resource, or API group.
pub const WILDCARD: &str = "*";

/// The scope at which rules are granted.
///
/// For roles this is the role's own scope; when resolving a subject's permissions it is the scope
/// of the binding that grants the role.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Namespace,
    Cluster,
}

/// A single RBAC grant of verbs over resources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    /// When non-empty, the rule only applies to the named objects.
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

// === impl Scope ===

impl Scope {
    #[inline]
    pub fn is_cluster(self) -> bool {
        matches!(self, Self::Cluster)
    }
}

// === impl PolicyRule ===

impl PolicyRule {
    pub fn grants_verb(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == WILDCARD || v == verb)
    }

    pub fn covers_resource(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == WILDCARD || r == resource)
    }

    /// Returns true if the rule applies to every object of every resource type.
    pub fn covers_all_resources(&self) -> bool {
        self.resource_names.is_empty() && self.resources.iter().any(|r| r == WILDCARD)
    }

    pub fn matches(&self, verb: &str, resource: &str) -> bool {
        self.grants_verb(verb) && self.covers_resource(resource)
    }
}
