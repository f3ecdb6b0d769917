use crate::k8s::feed::EventKind;
use crate::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus counters for watch sessions and address lookups
#[derive(Clone)]
pub struct MetricsCollector {
    /// Events dispatched to session callbacks, by kind
    pub watch_events_total: IntCounterVec,
    /// Local address lookups, by the source that answered
    pub local_address_lookups_total: IntCounterVec,
    registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let watch_events_total = IntCounterVec::new(
            Opts::new(
                "meshwatch_watch_events_total",
                "Pod events dispatched to watch session callbacks",
            ),
            &["kind"],
        )?;

        let local_address_lookups_total = IntCounterVec::new(
            Opts::new(
                "meshwatch_local_address_lookups_total",
                "Local address lookups by answering source",
            ),
            &["source"],
        )?;

        registry.register(Box::new(watch_events_total.clone()))?;
        registry.register(Box::new(local_address_lookups_total.clone()))?;

        Ok(Self {
            watch_events_total,
            local_address_lookups_total,
            registry,
        })
    }

    pub fn record_event(&self, kind: EventKind) {
        self.watch_events_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn record_lookup(&self, source: &str) {
        self.local_address_lookups_total
            .with_label_values(&[source])
            .inc();
    }

    /// Render all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::MeshwatchError::MetricsError(prometheus::Error::Msg(e.to_string())))
    }
}
