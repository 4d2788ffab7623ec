//! Scores a set of RBAC rules as a single [`PermissionLevel`].
//!
//! Classification only considers verbs and resources. API groups are carried on each rule but do
//! not narrow a match: a wildcard resource in the core group is treated the same as one in `*`.
//!
//! A rule set is scored by the broadest capability it grants:
//!
//! - `*` verbs over `*` resources is administrative access.
//! - Any write or escalation verb, reads over `*` resources, reads of a sensitive resource, or the
//!   combination of `get` and `list` is elevated access.
//! - Any other recognized verb is default access.
//!
//! The result is then capped by the scope at which the rules are granted; see
//! [`PermissionLevel::capped`].

use crate::{PermissionLevel, PolicyRule, Scope, WILDCARD};
use ahash::AHashSet as HashSet;

/// Resources whose read access is treated as elevated when no other list is configured.
pub const DEFAULT_SENSITIVE_RESOURCES: [&str; 9] = [
    "secrets",
    "roles",
    "rolebindings",
    "clusterroles",
    "clusterrolebindings",
    "pods/exec",
    "pods/attach",
    "serviceaccounts/token",
    "nodes/proxy",
];

#[derive(Clone, Debug)]
pub struct Classifier {
    sensitive_resources: HashSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Verb {
    Get,
    List,
    Watch,
    Write,
    Escalate,
    Any,
}

/// The capabilities granted by a rule set, accumulated over all of its rules.
#[derive(Debug, Default)]
struct Capabilities {
    any: bool,
    get: bool,
    list: bool,
    elevated: bool,
    admin: bool,
}

// === impl Classifier ===

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_RESOURCES)
    }
}

impl Classifier {
    pub fn new(sensitive_resources: impl IntoIterator<Item = impl ToString>) -> Self {
        Self {
            sensitive_resources: sensitive_resources
                .into_iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }

    pub fn is_sensitive(&self, resource: &str) -> bool {
        self.sensitive_resources.contains(resource)
    }

    /// Scores the rules granted at the given scope.
    ///
    /// Never fails: rules with no recognized verbs or no resources contribute nothing, so an empty
    /// or malformed rule set is classified as `None`.
    pub fn classify<'r>(
        &self,
        rules: impl IntoIterator<Item = &'r PolicyRule>,
        scope: Scope,
    ) -> PermissionLevel {
        let caps = self.capabilities(rules);
        let level = if caps.admin {
            PermissionLevel::ClusterAdmin
        } else if caps.elevated || (caps.get && caps.list) {
            PermissionLevel::ElevatedClusterWide
        } else if caps.any {
            PermissionLevel::Default
        } else {
            PermissionLevel::None
        };
        level.capped(scope)
    }

    fn capabilities<'r>(&self, rules: impl IntoIterator<Item = &'r PolicyRule>) -> Capabilities {
        let mut caps = Capabilities::default();
        for rule in rules {
            if rule.resources.is_empty() {
                continue;
            }

            let all_resources = rule.covers_all_resources();
            let sensitive = self
                .sensitive_resources
                .iter()
                .any(|r| rule.covers_resource(r));

            for verb in rule.verbs.iter().filter_map(|v| Verb::parse(v)) {
                caps.any = true;
                match verb {
                    Verb::Any if all_resources => caps.admin = true,
                    Verb::Any | Verb::Write | Verb::Escalate => caps.elevated = true,
                    Verb::Get | Verb::List | Verb::Watch => {
                        caps.elevated |= all_resources || sensitive;
                        caps.get |= verb == Verb::Get;
                        caps.list |= verb == Verb::List;
                    }
                }
            }
        }
        caps
    }
}

// === impl Verb ===

impl Verb {
    fn parse(verb: &str) -> Option<Self> {
        match verb {
            "get" => Some(Self::Get),
            "list" => Some(Self::List),
            "watch" => Some(Self::Watch),
            "create" | "update" | "patch" | "delete" | "deletecollection" => Some(Self::Write),
            "bind" | "escalate" | "impersonate" => Some(Self::Escalate),
            WILDCARD => Some(Self::Any),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rule(resources: &[&str], verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: vec!["".to_string()],
            resources: resources.iter().map(|s| s.to_string()).collect(),
            resource_names: vec![],
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[rstest]
    #[case::admin(vec![rule(&["*"], &["*"])], PermissionLevel::ClusterAdmin)]
    #[case::admin_with_extra_rule(
        vec![rule(&["*"], &["get"]), rule(&["*"], &["*"])],
        PermissionLevel::ClusterAdmin
    )]
    #[case::get_all(vec![rule(&["*"], &["get"])], PermissionLevel::ElevatedClusterWide)]
    #[case::deletecollection_all(
        vec![rule(&["*"], &["deletecollection"])],
        PermissionLevel::ElevatedClusterWide
    )]
    #[case::deletecollection_pods(
        vec![rule(&["pod"], &["deletecollection"]), rule(&["pod"], &["deletecollection"])],
        PermissionLevel::ElevatedClusterWide
    )]
    #[case::get_and_list_in_one_rule(
        vec![rule(&[""], &["get", "list"])],
        PermissionLevel::ElevatedClusterWide
    )]
    #[case::get_and_list_in_two_rules(
        vec![rule(&[""], &["get"]), rule(&[""], &["list"])],
        PermissionLevel::ElevatedClusterWide
    )]
    #[case::read_secrets(vec![rule(&["secrets"], &["watch"])], PermissionLevel::ElevatedClusterWide)]
    #[case::impersonate(vec![rule(&["users"], &["impersonate"])], PermissionLevel::ElevatedClusterWide)]
    #[case::get_one(vec![rule(&[""], &["get"])], PermissionLevel::Default)]
    #[case::list_pods(vec![rule(&["pods"], &["list"])], PermissionLevel::Default)]
    #[case::invalid_verb(vec![rule(&["*"], &["invalidverb"])], PermissionLevel::None)]
    #[case::no_verbs(vec![rule(&["*"], &[])], PermissionLevel::None)]
    #[case::no_resources(vec![rule(&[], &["*"])], PermissionLevel::None)]
    #[case::no_rules(vec![], PermissionLevel::None)]
    fn cluster_scope(#[case] rules: Vec<PolicyRule>, #[case] expected: PermissionLevel) {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(&rules, Scope::Cluster), expected);
    }

    #[rstest]
    #[case::admin(vec![rule(&["*"], &["*"])], PermissionLevel::ElevatedInNamespace)]
    #[case::get_all(vec![rule(&["*"], &["get"])], PermissionLevel::ElevatedInNamespace)]
    #[case::get_one(vec![rule(&[""], &["get"])], PermissionLevel::Default)]
    #[case::invalid_verb(vec![rule(&["*"], &["invalidverb"])], PermissionLevel::None)]
    fn namespace_scope(#[case] rules: Vec<PolicyRule>, #[case] expected: PermissionLevel) {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(&rules, Scope::Namespace), expected);
    }

    #[test]
    fn named_resources_are_not_admin() {
        let rules = [PolicyRule {
            resource_names: vec!["kube-root-ca.crt".to_string()],
            ..rule(&["*"], &["*"])
        }];
        assert_eq!(
            Classifier::default().classify(&rules, Scope::Cluster),
            PermissionLevel::ElevatedClusterWide
        );
    }

    #[test]
    fn sensitive_resources_are_configurable() {
        let rules = [rule(&["configmaps"], &["get"])];
        assert_eq!(
            Classifier::default().classify(&rules, Scope::Cluster),
            PermissionLevel::Default
        );

        let classifier = Classifier::new(["configmaps"]);
        assert!(classifier.is_sensitive("configmaps"));
        assert!(!classifier.is_sensitive("secrets"));
        assert_eq!(
            classifier.classify(&rules, Scope::Cluster),
            PermissionLevel::ElevatedClusterWide
        );
    }
}
