#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod classify;
mod permission;
mod rule;
mod subject;

pub use self::{
    classify::Classifier,
    permission::PermissionLevel,
    rule::{PolicyRule, Scope, WILDCARD},
    subject::{InvalidServiceAccountRef, ServiceAccountRef, Subject, SERVICE_ACCOUNT_KIND},
};
