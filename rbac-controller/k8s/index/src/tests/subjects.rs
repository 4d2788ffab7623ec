use super::*;
use rbac_controller_core::PermissionLevel;

fn meta(name: &str) -> k8s::ObjectMeta {
    mk_meta("n1", name, &format!("{name}-id"))
}

fn store_with_bindings() -> SharedStore {
    let test = TestConfig::default();
    test.store.upsert_role(mk_role(
        meta("role-admin"),
        Some(mk_rule([""], ["*"], ["*"])),
    ));
    test.store.upsert_binding(mk_binding(
        meta("b1"),
        role_ref(k8s::ROLE_KIND, "role-admin"),
        [
            sa_subject("n1", "cluster-namespace-subject"),
            sa_subject("n1", "admin-subject"),
        ],
    ));
    test.store.upsert_binding(mk_binding(
        meta("b2"),
        role_ref(k8s::ROLE_KIND, "role-default"),
        Some(sa_subject("n1", "default-subject")),
    ));
    // A cluster binding that reuses a UID must not be reported as a role binding.
    test.store.upsert_cluster_binding(mk_cluster_binding(
        meta("b2"),
        "cluster-admin",
        Some(sa_subject("", "cluster-admin-subject")),
    ));
    test.store
}

#[test]
fn find_subjects_for_role() {
    let store = store_with_bindings();
    assert_eq!(
        store.find_subjects_for_role("n1", "role-admin"),
        vec![
            sa("n1", "admin-subject"),
            sa("n1", "cluster-namespace-subject"),
        ]
    );

    // The role's existence doesn't matter, only the bindings that reference it.
    assert_eq!(
        store.find_subjects_for_role("n1", "role-default"),
        vec![sa("n1", "default-subject")]
    );
    assert_eq!(store.find_subjects_for_role("n2", "role-admin"), vec![]);
    assert_eq!(store.find_subjects_for_role("n1", "cluster-admin"), vec![]);
}

#[test]
fn find_subjects_for_binding_id() {
    let store = store_with_bindings();
    assert_eq!(
        store.find_subjects_for_binding_id("n1", "b1-id"),
        vec![
            sa("n1", "admin-subject"),
            sa("n1", "cluster-namespace-subject"),
        ]
    );
    assert_eq!(
        store.find_subjects_for_binding_id("n1", "b2-id"),
        vec![sa("n1", "default-subject")]
    );
    assert_eq!(store.find_subjects_for_binding_id("n2", "b1-id"), vec![]);
    assert_eq!(store.find_subjects_for_binding_id("n1", "missing"), vec![]);
}

#[test]
fn lookup_by_packed_key() {
    let store = store_with_bindings();
    let key = "n1#admin-subject"
        .parse::<ServiceAccountRef>()
        .expect("key must parse");
    assert_eq!(
        store.permission_level_for_deployment(&key),
        PermissionLevel::ElevatedInNamespace
    );
    assert!("admin-subject".parse::<ServiceAccountRef>().is_err());
}

#[test]
fn role_updates_invalidate_cached_levels() {
    let test = TestConfig::default();
    test.store.upsert_binding(mk_binding(
        mk_meta("ns-0", "b", "b"),
        role_ref(k8s::ROLE_KIND, "r"),
        Some(sa_subject("ns-1", "sa-1")),
    ));
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-1", "sa-1")),
        PermissionLevel::None
    );
    assert_eq!(test.store.sizes().cached_levels, 1);

    // The binding names a service account in another namespace, whose cached level must be
    // dropped when the role arrives.
    test.store.upsert_role(mk_role(
        mk_meta("ns-0", "r", "r"),
        Some(mk_rule([""], ["pods"], ["get"])),
    ));
    assert_eq!(test.store.sizes().cached_levels, 0);
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-1", "sa-1")),
        PermissionLevel::Default
    );
}

#[test]
fn namespaced_mutations_keep_unrelated_cached_levels() {
    let test = TestConfig::default();
    let _ = test
        .store
        .permission_level_for_deployment(&sa("ns-0", "sa-0"));
    let _ = test
        .store
        .permission_level_for_deployment(&sa("ns-1", "sa-1"));
    assert_eq!(test.store.sizes().cached_levels, 2);

    test.store.upsert_role(mk_role(
        mk_meta("ns-0", "r", "r"),
        Some(mk_rule([""], ["*"], ["*"])),
    ));
    test.store.upsert_binding(mk_binding(
        mk_meta("ns-0", "b", "b"),
        role_ref(k8s::ROLE_KIND, "r"),
        Some(sa_subject("ns-0", "sa-0")),
    ));
    assert_eq!(test.store.sizes().cached_levels, 1);
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-0", "sa-0")),
        PermissionLevel::ElevatedInNamespace
    );

    // Cluster roles may be granted anywhere.
    test.store
        .upsert_cluster_role(mk_cluster_role(mk_meta("", "view", "view"), None));
    assert_eq!(test.store.sizes().cached_levels, 0);
}

#[test]
fn binding_updates_invalidate_prior_subjects() {
    let test = TestConfig::default();
    test.store.upsert_cluster_role(mk_cluster_role(
        mk_meta("", "admin", "admin"),
        Some(mk_rule(["*"], ["*"], ["*"])),
    ));
    test.store.upsert_cluster_binding(mk_cluster_binding(
        mk_meta("", "b", "b"),
        "admin",
        Some(sa_subject("ns-0", "sa-0")),
    ));
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-0", "sa-0")),
        PermissionLevel::ClusterAdmin
    );

    // Moving the grant to another subject must revoke it from the first.
    test.store.upsert_cluster_binding(mk_cluster_binding(
        mk_meta("", "b", "b"),
        "admin",
        Some(sa_subject("ns-1", "sa-1")),
    ));
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-0", "sa-0")),
        PermissionLevel::None
    );
    assert_eq!(
        test.store
            .permission_level_for_deployment(&sa("ns-1", "sa-1")),
        PermissionLevel::ClusterAdmin
    );
}
