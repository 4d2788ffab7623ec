use ahash::AHashMap as HashMap;
use rbac_controller_core::{PermissionLevel, ServiceAccountRef};

/// Memoizes permission levels by service account, partitioned by namespace so that mutations
/// confined to a few namespaces don't discard the whole cache.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    by_ns: HashMap<String, HashMap<String, PermissionLevel>>,
}

// === impl EvaluationCache ===

impl EvaluationCache {
    pub fn get(&self, sa: &ServiceAccountRef) -> Option<PermissionLevel> {
        self.by_ns.get(&sa.namespace)?.get(&sa.name).copied()
    }

    pub fn insert(&mut self, sa: &ServiceAccountRef, level: PermissionLevel) {
        self.by_ns
            .entry(sa.namespace.clone())
            .or_default()
            .insert(sa.name.clone(), level);
    }

    /// Drops all cached levels for service accounts in the given namespaces.
    pub fn invalidate<I>(&mut self, namespaces: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for ns in namespaces {
            if self.by_ns.remove(ns.as_ref()).is_some() {
                tracing::trace!(ns = %ns.as_ref(), "invalidated cached permission levels");
            }
        }
    }

    pub fn clear(&mut self) {
        self.by_ns.clear();
    }

    pub fn len(&self) -> usize {
        self.by_ns.values().map(|names| names.len()).sum()
    }
}
