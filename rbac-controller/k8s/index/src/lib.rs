//! RBAC permission index
//!
//! Maintains an in-memory graph of the cluster's RBAC objects and answers, for a workload's service
//! account, the highest permission level it holds:
//!
//! - A `Role` holds rules that apply within its namespace.
//! - A `ClusterRole` holds rules that may apply cluster-wide.
//! - A `RoleBinding` grants a `Role` in its own namespace, or a `ClusterRole` limited to its own
//!   namespace, to a list of subjects.
//! - A `ClusterRoleBinding` grants a `ClusterRole` cluster-wide to a list of subjects.
//!
//! ```text
//! [ ServiceAccount ] <- [ (Cluster)RoleBinding ] -> [ (Cluster)Role ] -> [ PolicyRule ]
//! ```
//!
//! Watch events are applied by the [`Dispatcher`], which updates the [`Store`] and emits a
//! [`ResourceEvent`] for each change. Bindings may arrive before the roles they reference; such
//! references simply resolve to nothing until the role is indexed.
//!
//! Permission levels are computed lazily on lookup and cached until a mutation affects one of the
//! service account's bindings or roles.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod binding;
mod cache;
mod dispatch;
mod event;
mod index;
pub mod metrics;
mod resolve;
mod role;
mod store;


pub use self::{
    binding::{Binding, BindingIndex, RoleRef},
    dispatch::{dispatch, Dispatcher, Kind, RbacObject, RbacResource},
    event::{Action, BindingEvent, Resource, ResourceEvent, RoleEvent},
    index::{Indexed, ObjectIndex, Removal, ResourceKey, Upsert, Versioned},
    metrics::DispatchMetrics,
    resolve::{permission_level, rule_sets_for, RuleSet},
    role::{Role, RoleIndex},
    store::{SharedStore, Store, StoreSizes},
};
