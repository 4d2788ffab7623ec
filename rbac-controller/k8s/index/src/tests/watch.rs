use super::*;
use crate::{dispatch, metrics, Action, ResourceEvent};
use futures::stream;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::mpsc;

async fn run<K: crate::RbacResource>(
    dispatcher: Arc<Dispatcher>,
    events: Vec<watcher::Event<K>>,
) -> Vec<(String, Action)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ResourceEvent>();
    dispatch(dispatcher, stream::iter(events), tx).await;
    let mut out = vec![];
    while let Some(event) = rx.recv().await {
        out.push((event.id, event.action));
    }
    out
}

fn role(name: &str) -> k8s::Role {
    mk_role(mk_meta("ns-0", name, name), None)
}

#[tokio::test(flavor = "current_thread")]
async fn resync_removes_unlisted_objects() {
    let test = TestConfig::default();
    let dispatcher = Arc::new(test.dispatcher);
    dispatcher.process_event(role("r1"), Action::Create);
    dispatcher.process_event(role("r2"), Action::Create);

    let events = run(
        dispatcher.clone(),
        vec![
            watcher::Event::Init,
            watcher::Event::InitApply(role("r1")),
            watcher::Event::InitDone,
            watcher::Event::Apply(role("r3")),
            watcher::Event::Apply(role("r3")),
            watcher::Event::Delete(role("r1")),
        ],
    )
    .await;
    assert_eq!(
        events,
        vec![
            ("r1".to_string(), Action::Sync),
            ("r2".to_string(), Action::Remove),
            ("r3".to_string(), Action::Create),
            ("r3".to_string(), Action::Update),
            ("r1".to_string(), Action::Remove),
        ]
    );
    assert_eq!(test.store.sizes().roles, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn resync_is_limited_to_its_kind() {
    let test = TestConfig::default();
    let dispatcher = Arc::new(test.dispatcher);
    dispatcher.process_event(role("r1"), Action::Create);
    dispatcher.process_event(
        mk_binding(
            mk_meta("ns-0", "b1", "b1"),
            role_ref(k8s::ROLE_KIND, "r1"),
            None,
        ),
        Action::Create,
    );
    dispatcher.process_event(
        mk_cluster_role(mk_meta("", "cr1", "cr1"), None),
        Action::Create,
    );

    // An empty listing of cluster roles must not remove roles or bindings.
    let events = run::<k8s::ClusterRole>(
        dispatcher.clone(),
        vec![watcher::Event::Init, watcher::Event::InitDone],
    )
    .await;
    assert_eq!(events, vec![("cr1".to_string(), Action::Remove)]);

    let sizes = test.store.sizes();
    assert_eq!(sizes.roles, 1);
    assert_eq!(sizes.bindings, 1);
    assert_eq!(sizes.cluster_roles, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn resynced_bindings_report_role_ids() {
    let test = TestConfig::default();
    let dispatcher = Arc::new(test.dispatcher);
    let binding = mk_binding(
        mk_meta("ns-0", "b1", "b1"),
        role_ref(k8s::ROLE_KIND, "r1"),
        None,
    );

    let role_ids = |events: Vec<ResourceEvent>| {
        events
            .iter()
            .filter_map(|e| e.as_binding().map(|b| b.role_id.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        role_ids(dispatcher.process_event(binding.clone(), Action::Create)),
        vec![String::new()]
    );
    dispatcher.process_event(role("r1"), Action::Create);

    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatch(
        dispatcher,
        stream::iter(vec![
            watcher::Event::Init,
            watcher::Event::InitApply(binding),
            watcher::Event::InitDone,
        ]),
        tx,
    )
    .await;
    let mut events = vec![];
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(role_ids(events), vec!["r1".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn applies_events_after_receiver_drops() {
    let test = TestConfig::default();
    let dispatcher = Arc::new(test.dispatcher);

    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    dispatch(
        dispatcher,
        stream::iter(vec![
            watcher::Event::Apply(role("r1")),
            watcher::Event::Apply(role("r2")),
            watcher::Event::Delete(role("r1")),
            watcher::Event::Apply(role("r3")),
        ]),
        tx,
    )
    .await;

    assert_eq!(test.store.sizes().roles, 2);
}

#[test]
fn records_metrics() {
    let test = TestConfig::default();
    let mut prom = Registry::default();
    let dispatcher = Dispatcher::new(test.store.clone(), DispatchMetrics::register(&mut prom));
    metrics::register(&mut prom, test.store.clone());

    let v1 = mk_role(mk_meta("ns-0", "r", "v1"), None);
    let v2 = mk_role(mk_meta("ns-0", "r", "v2"), None);
    dispatcher.process_event(v1.clone(), Action::Create);
    dispatcher.process_event(v2, Action::Update);
    dispatcher.process_event(v1, Action::Remove);
    dispatcher.process_event(
        mk_cluster_binding(mk_meta("", "crb", "crb"), "admin", Some(sa_subject("ns-0", "sa"))),
        Action::Create,
    );
    let _ = test
        .store
        .permission_level_for_deployment(&sa("ns-0", "sa"));

    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &prom).expect("metrics must encode");
    for line in [
        r#"events_total{kind="Role",action="CREATE"} 1"#,
        r#"events_total{kind="Role",action="UPDATE"} 1"#,
        r#"events_total{kind="ClusterRoleBinding",action="CREATE"} 1"#,
        r#"stale_removals_total{kind="Role"} 1"#,
        r#"role_index_size{scope="namespace"} 1"#,
        r#"role_index_size{scope="cluster"} 0"#,
        r#"binding_index_size{scope="cluster"} 1"#,
        "permission_cache_size 1",
    ] {
        assert!(buf.contains(line), "missing {line:?} in:\n{buf}");
    }
}
