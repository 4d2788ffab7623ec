use std::{fmt, str::FromStr};

/// The only subject kind that participates in permission resolution.
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Separates the namespace and name of a packed service account key.
const KEY_SEPARATOR: char = '#';

/// An identity named by a binding.
///
/// Users and groups are retained so that binding events describe the full subject list, but only
/// service accounts are scored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

/// Identifies a workload's service account.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceAccountRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidServiceAccountRef {
    #[error("service account key {0:?} is missing a '#' separator")]
    MissingSeparator(String),

    #[error("service account key {0:?} has an empty name")]
    EmptyName(String),

    #[error("service account key {0:?} has more than one '#' separator")]
    ExtraSeparator(String),
}

// === impl Subject ===

impl Subject {
    /// Returns the service account named by this subject, if it is one.
    pub fn service_account(&self) -> Option<ServiceAccountRef> {
        if self.kind != SERVICE_ACCOUNT_KIND {
            return None;
        }
        Some(ServiceAccountRef::new(&self.namespace, &self.name))
    }
}

// === impl ServiceAccountRef ===

impl ServiceAccountRef {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Formats the packed `namespace#name` key.
impl fmt::Display for ServiceAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, KEY_SEPARATOR, self.name)
    }
}

impl FromStr for ServiceAccountRef {
    type Err = InvalidServiceAccountRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| InvalidServiceAccountRef::MissingSeparator(s.to_string()))?;
        if name.contains(KEY_SEPARATOR) {
            return Err(InvalidServiceAccountRef::ExtraSeparator(s.to_string()));
        }
        if name.is_empty() {
            return Err(InvalidServiceAccountRef::EmptyName(s.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}
