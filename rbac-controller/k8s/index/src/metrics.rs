use crate::{dispatch::Kind, event::ResourceEvent, store::SharedStore};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeLabelSet, EncodeMetric},
    metrics::{counter::Counter, family::Family, gauge::ConstGauge, MetricType},
    registry::Registry,
};

/// Counts the events produced by a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug, Default)]
pub struct DispatchMetrics {
    events: Family<EventLabels, Counter>,
    stale_removals: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    kind: String,
    action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

#[derive(Debug)]
struct Instrumented(SharedStore);

/// Registers gauges reporting the size of the store's indexes.
pub fn register(reg: &mut Registry, store: SharedStore) {
    reg.register_collector(Box::new(Instrumented(store)));
}

// === impl DispatchMetrics ===

impl DispatchMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let events = Family::default();
        prom.register(
            "events",
            "Count of resource events produced by the dispatcher",
            events.clone(),
        );

        let stale_removals = Family::default();
        prom.register(
            "stale_removals",
            "Count of removals ignored because a newer object was stored",
            stale_removals.clone(),
        );

        Self {
            events,
            stale_removals,
        }
    }

    pub(crate) fn record(&self, kind: Kind, events: &[ResourceEvent]) {
        for event in events {
            self.events
                .get_or_create(&EventLabels {
                    kind: kind.to_string(),
                    action: event.action.to_string(),
                })
                .inc();
        }
    }

    pub(crate) fn stale_removal(&self, kind: Kind) {
        self.stale_removals
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc();
    }
}

// === impl Instrumented ===

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let sizes = self.0.sizes();

        let mut roles_encoder = encoder.encode_descriptor(
            "role_index_size",
            "The number of roles in index",
            None,
            MetricType::Gauge,
        )?;
        for (scope, size) in [("namespace", sizes.roles), ("cluster", sizes.cluster_roles)] {
            let labels = [("scope", scope)];
            let roles = ConstGauge::new(size as i64);
            let roles_encoder = roles_encoder.encode_family(&labels)?;
            roles.encode(roles_encoder)?;
        }

        let mut bindings_encoder = encoder.encode_descriptor(
            "binding_index_size",
            "The number of bindings in index",
            None,
            MetricType::Gauge,
        )?;
        for (scope, size) in [
            ("namespace", sizes.bindings),
            ("cluster", sizes.cluster_bindings),
        ] {
            let labels = [("scope", scope)];
            let bindings = ConstGauge::new(size as i64);
            let bindings_encoder = bindings_encoder.encode_family(&labels)?;
            bindings.encode(bindings_encoder)?;
        }

        let cache_encoder = encoder.encode_descriptor(
            "permission_cache_size",
            "The number of cached permission levels",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(sizes.cached_levels as i64).encode(cache_encoder)?;

        Ok(())
    }
}
