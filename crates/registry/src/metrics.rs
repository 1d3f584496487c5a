use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounterVec, IntGaugeVec, Registry};
use tracing::error;

use crate::model::StateCounts;

lazy_static! {
    static ref REGISTRY_ITEMS: IntGaugeVec = IntGaugeVec::new(
        opts!("feedwarden_registry_items", "Tracked feed items grouped by state"),
        &["state"]
    )
    .unwrap();
    static ref REGISTRY_REBINDS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "feedwarden_registry_bindings_total",
            "View handle bindings grouped by outcome"
        ),
        &["outcome"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register item registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, REGISTRY_ITEMS.clone());
    register(registry, REGISTRY_REBINDS_TOTAL.clone());
}

pub fn set_state_counts(counts: &StateCounts) {
    REGISTRY_ITEMS
        .with_label_values(&["unseen"])
        .set(counts.unseen as i64);
    REGISTRY_ITEMS
        .with_label_values(&["queued"])
        .set(counts.queued as i64);
    REGISTRY_ITEMS
        .with_label_values(&["scored"])
        .set(counts.scored as i64);
}

pub fn record_binding(outcome: &str) {
    REGISTRY_REBINDS_TOTAL.with_label_values(&[outcome]).inc();
}
