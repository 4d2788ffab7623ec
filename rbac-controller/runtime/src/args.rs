use crate::{
    core::Classifier,
    index::{self, Dispatcher, DispatchMetrics, ResourceEvent, Store},
    k8s,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "rbac", about = "An RBAC permission-level controller")]
pub struct Args {
    #[clap(long, default_value = "rbac=info,warn", env = "RBAC_CONTROLLER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Resources whose read access is treated as elevated.
    ///
    /// A comma-separated list of resources (e.g. `secrets,pods/exec`) that replaces the default
    /// set.
    #[clap(long)]
    sensitive_resources: Option<Resources>,
}

#[derive(Clone, Debug)]
struct Resources(Vec<String>);

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            sensitive_resources,
        } = self;

        let classifier = match sensitive_resources {
            Some(Resources(resources)) => Classifier::new(resources),
            None => Classifier::default(),
        };
        let store = Store::shared(classifier);

        let mut prom = <Registry>::default();
        let rbac = prom.sub_registry_with_prefix("rbac");
        index::metrics::register(rbac, store.clone());
        let dispatch_metrics = DispatchMetrics::register(rbac);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let dispatcher = Arc::new(Dispatcher::new(store, dispatch_metrics));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // Spawn resource watches.

        let roles = runtime.watch_all::<k8s::Role>(watcher::Config::default());
        tokio::spawn(
            index::dispatch(dispatcher.clone(), roles, events_tx.clone())
                .instrument(info_span!("roles")),
        );

        let cluster_roles = runtime.watch_all::<k8s::ClusterRole>(watcher::Config::default());
        tokio::spawn(
            index::dispatch(dispatcher.clone(), cluster_roles, events_tx.clone())
                .instrument(info_span!("clusterroles")),
        );

        let bindings = runtime.watch_all::<k8s::RoleBinding>(watcher::Config::default());
        tokio::spawn(
            index::dispatch(dispatcher.clone(), bindings, events_tx.clone())
                .instrument(info_span!("rolebindings")),
        );

        let cluster_bindings =
            runtime.watch_all::<k8s::ClusterRoleBinding>(watcher::Config::default());
        tokio::spawn(
            index::dispatch(dispatcher, cluster_bindings, events_tx)
                .instrument(info_span!("clusterrolebindings")),
        );

        tokio::spawn(publish(events_rx).instrument(info_span!("events")));

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Reports resource events until all dispatchers have stopped.
async fn publish(mut rx: mpsc::UnboundedReceiver<ResourceEvent>) {
    while let Some(event) = rx.recv().await {
        match event.as_binding() {
            Some(binding) => tracing::debug!(
                id = %event.id,
                action = %event.action,
                name = %binding.name,
                role_id = %binding.role_id,
                subjects = binding.subjects.len(),
                "binding"
            ),
            None => tracing::debug!(id = %event.id, action = %event.action, "role"),
        }
    }
    tracing::debug!("resource event dispatchers stopped");
}

impl std::str::FromStr for Resources {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let resources = s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if resources.is_empty() {
            bail!("at least one resource must be specified");
        }
        Ok(Self(resources))
    }
}
