//! Resolves the roles granted to a service account.

use crate::{
    binding::BindingIndex,
    index::ResourceKey,
    role::{Role, RoleIndex},
};
use ahash::AHashSet as HashSet;
use rbac_controller_core::{Classifier, PermissionLevel, Scope, ServiceAccountRef};
use std::sync::Arc;

/// A role's rules as granted to a subject.
#[derive(Clone, Debug)]
pub struct RuleSet {
    pub role: Arc<Role>,
    pub revision: u64,

    /// The scope of the binding that grants the role. A `ClusterRole` granted by a `RoleBinding`
    /// only applies within the binding's namespace.
    pub scope: Scope,
}

/// Returns the rule sets that apply to a service account.
///
/// Namespaced bindings may grant a `Role` in their own namespace or a `ClusterRole`; cluster
/// bindings may only grant a `ClusterRole`. Bindings whose role does not exist are skipped. A role
/// granted several times at the same scope is only returned once.
pub fn rule_sets_for(
    roles: &RoleIndex,
    bindings: &BindingIndex,
    sa: &ServiceAccountRef,
) -> Vec<RuleSet> {
    let mut seen = HashSet::<(ResourceKey, u64, Scope)>::new();
    bindings
        .for_service_account(sa)
        .filter_map(|binding| {
            let binding = binding.object();
            let role_key = binding.role_key();
            let Some(role) = roles.get(&role_key) else {
                tracing::trace!(binding = %binding.key, role = %role_key, "dangling role reference");
                return None;
            };
            let scope = binding.key.scope;
            if !seen.insert((role_key, role.revision(), scope)) {
                return None;
            }
            Some(RuleSet {
                role: role.object().clone(),
                revision: role.revision(),
                scope,
            })
        })
        .collect()
}

/// Scores each rule set and returns the highest level.
pub fn permission_level(classifier: &Classifier, rule_sets: &[RuleSet]) -> PermissionLevel {
    rule_sets
        .iter()
        .map(|rs| classifier.classify(&rs.role.rules, rs.scope))
        .max()
        .unwrap_or_default()
}
