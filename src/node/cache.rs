//! Verdict cache for local address lookups
//!
//! Each uncached lookup rereads the address list file or rescans the
//! interface table. Pod event handlers ask about the same pod IPs over and
//! over, so verdicts are kept for a short TTL.

use crate::metrics::MetricsCollector;
use crate::node::local::{InterfaceAddrs, LocalAddressResolver, SystemInterfaces};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct Verdict {
    local: bool,
    checked_at: Instant,
}

/// Thread-safe, TTL-bounded cache in front of a [`LocalAddressResolver`]
#[derive(Clone)]
pub struct CachedResolver<I = SystemInterfaces> {
    resolver: Arc<LocalAddressResolver<I>>,
    verdicts: Arc<DashMap<String, Verdict>>,
    ttl: Duration,
    metrics: Option<MetricsCollector>,
}

impl<I: InterfaceAddrs> CachedResolver<I> {
    pub fn new(resolver: LocalAddressResolver<I>) -> Self {
        Self::with_ttl(resolver, DEFAULT_TTL)
    }

    pub fn with_ttl(resolver: LocalAddressResolver<I>, ttl: Duration) -> Self {
        Self {
            resolver: Arc::new(resolver),
            verdicts: Arc::new(DashMap::new()),
            ttl,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_local(&self, candidate: &str) -> bool {
        if let Some(verdict) = self.verdicts.get(candidate) {
            if verdict.checked_at.elapsed() < self.ttl {
                self.record("cache");
                return verdict.local;
            }
        }

        let (local, source) = self.resolver.lookup(candidate);
        self.record(source.as_str());
        debug!("Resolved {} as local={} via {}", candidate, local, source.as_str());

        // a miss also drops every verdict past its TTL
        self.evict_expired();
        self.verdicts.insert(
            candidate.to_string(),
            Verdict {
                local,
                checked_at: Instant::now(),
            },
        );
        local
    }

    fn evict_expired(&self) {
        let ttl = self.ttl;
        self.verdicts.retain(|_, v| v.checked_at.elapsed() < ttl);
    }

    /// Drop every cached verdict, e.g. after the list file is rewritten.
    pub fn invalidate(&self) {
        self.verdicts.clear();
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    fn record(&self, source: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_lookup(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInterfaces {
        calls: AtomicUsize,
    }

    impl InterfaceAddrs for Arc<CountingInterfaces> {
        fn addresses(&self) -> io::Result<Vec<IpAddr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["192.168.1.10".parse().unwrap()])
        }
    }

    #[test]
    fn test_cached_verdict_skips_rescan() {
        let counter = Arc::new(CountingInterfaces::default());
        let cache = CachedResolver::new(LocalAddressResolver::with_interfaces(
            None,
            counter.clone(),
        ));

        assert!(cache.is_local("192.168.1.10"));
        assert!(cache.is_local("192.168.1.10"));
        assert!(!cache.is_local("10.0.0.1"));

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_verdict_rescans() {
        let counter = Arc::new(CountingInterfaces::default());
        let cache = CachedResolver::with_ttl(
            LocalAddressResolver::with_interfaces(None, counter.clone()),
            Duration::ZERO,
        );

        cache.is_local("192.168.1.10");
        cache.is_local("192.168.1.10");

        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_verdicts_are_evicted() {
        let cache = CachedResolver::with_ttl(
            LocalAddressResolver::with_interfaces(None, Arc::new(CountingInterfaces::default())),
            Duration::ZERO,
        );

        for i in 0..10_000u32 {
            let octets = i.to_be_bytes();
            cache.is_local(&format!("10.{}.{}.{}", octets[1], octets[2], octets[3]));
        }

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fresh_verdicts_survive_eviction() {
        let cache = CachedResolver::new(LocalAddressResolver::with_interfaces(
            None,
            Arc::new(CountingInterfaces::default()),
        ));

        cache.is_local("10.0.0.1");
        cache.is_local("10.0.0.2");

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate() {
        let counter = Arc::new(CountingInterfaces::default());
        let cache = CachedResolver::new(LocalAddressResolver::with_interfaces(
            None,
            counter.clone(),
        ));

        cache.is_local("192.168.1.10");
        cache.invalidate();
        assert!(cache.is_empty());

        cache.is_local("192.168.1.10");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lookups_are_counted_by_source() {
        let metrics = MetricsCollector::new().unwrap();
        let cache = CachedResolver::new(LocalAddressResolver::with_interfaces(
            None,
            Arc::new(CountingInterfaces::default()),
        ))
        .with_metrics(metrics.clone());

        cache.is_local("192.168.1.10");
        cache.is_local("192.168.1.10");

        let text = metrics.gather().unwrap();
        assert!(text.contains("meshwatch_local_address_lookups_total{source=\"interfaces\"} 1"));
        assert!(text.contains("meshwatch_local_address_lookups_total{source=\"cache\"} 1"));
    }
}
