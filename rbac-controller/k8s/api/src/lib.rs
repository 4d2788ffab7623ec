#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use k8s_openapi::{
    api::rbac::v1::{
        ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time},
};
pub use kube::{Resource, ResourceExt};

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// The `roleRef.kind` of a binding that grants a namespaced `Role`.
pub const ROLE_KIND: &str = "Role";

/// The `roleRef.kind` of a binding that grants a `ClusterRole`.
pub const CLUSTER_ROLE_KIND: &str = "ClusterRole";
