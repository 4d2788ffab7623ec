use crate::Scope;
use std::fmt;

/// The aggregate Kubernetes permission level held by a workload's service account.
///
/// Variants are ordered by increasing risk, so the level granted by several role bindings is the
/// maximum of the levels granted by each of them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    #[default]
    None,
    Default,
    ElevatedInNamespace,
    ElevatedClusterWide,
    ClusterAdmin,
}

// === impl PermissionLevel ===

impl PermissionLevel {
    /// Limits the level to what can be granted at the given scope.
    ///
    /// Rules granted in a namespace can never reach beyond it, so namespace-scoped grants top out
    /// at `ElevatedInNamespace`.
    pub fn capped(self, scope: Scope) -> Self {
        match scope {
            Scope::Cluster => self,
            Scope::Namespace => self.min(Self::ElevatedInNamespace),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Default => "DEFAULT",
            Self::ElevatedInNamespace => "ELEVATED_IN_NAMESPACE",
            Self::ElevatedClusterWide => "ELEVATED_CLUSTER_WIDE",
            Self::ClusterAdmin => "CLUSTER_ADMIN",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
