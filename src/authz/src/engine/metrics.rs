//! Metrics collection for scope resolver observability

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::roles::Resolver;

/// Scope resolver metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverMetrics {
    /// Completed resolver builds
    pub rebuilds: u64,

    /// Client reloads that reused the existing resolver
    pub client_reloads: u64,

    /// Duration of the most recent build
    pub last_build_ms: f64,

    /// Distinct roles in the current resolver
    pub roles: usize,

    /// Clients in the current snapshot
    pub clients: usize,

    /// Pool entries in the current resolver
    pub pool_entries: usize,

    /// Trie states in the current resolver
    pub states: usize,

    /// Expansion cache hits
    pub cache_hits: u64,

    /// Expansion cache misses
    pub cache_misses: u64,

    /// Failed reloads
    pub error_count: u64,
}

impl ResolverMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Metrics collector with Prometheus-compatible export
///
/// Cache counters are atomics bumped on the query path. The rest is written
/// by reloads only.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<ResolverMetrics>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed resolver build
    pub fn record_rebuild(&self, elapsed: Duration, resolver: &Resolver, clients: usize) {
        let mut metrics = self.metrics.write();
        metrics.rebuilds += 1;
        metrics.last_build_ms = elapsed.as_secs_f64() * 1000.0;
        metrics.roles = resolver.role_count();
        metrics.pool_entries = resolver.pool_len();
        metrics.states = resolver.matcher().state_count();
        metrics.clients = clients;
    }

    /// Record a client reload
    pub fn record_client_reload(&self, clients: usize) {
        let mut metrics = self.metrics.write();
        metrics.client_reloads += 1;
        metrics.clients = clients;
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed reload
    pub fn record_error(&self) {
        self.metrics.write().error_count += 1;
    }

    /// Get current metrics snapshot
    pub fn get_metrics(&self) -> ResolverMetrics {
        ResolverMetrics {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            ..self.metrics.read().clone()
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        *self.metrics.write() = ResolverMetrics::default();
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.get_metrics();

        format!(
            r#"# HELP scopegraph_rebuilds_total Completed resolver builds
# TYPE scopegraph_rebuilds_total counter
scopegraph_rebuilds_total {}

# HELP scopegraph_client_reloads_total Client reloads
# TYPE scopegraph_client_reloads_total counter
scopegraph_client_reloads_total {}

# HELP scopegraph_build_seconds Duration of the most recent build
# TYPE scopegraph_build_seconds gauge
scopegraph_build_seconds {}

# HELP scopegraph_roles Distinct roles in the current resolver
# TYPE scopegraph_roles gauge
scopegraph_roles {}

# HELP scopegraph_clients Clients in the current snapshot
# TYPE scopegraph_clients gauge
scopegraph_clients {}

# HELP scopegraph_pool_entries Pool entries in the current resolver
# TYPE scopegraph_pool_entries gauge
scopegraph_pool_entries {}

# HELP scopegraph_states Trie states in the current resolver
# TYPE scopegraph_states gauge
scopegraph_states {}

# HELP scopegraph_cache_hits_total Expansion cache hits
# TYPE scopegraph_cache_hits_total counter
scopegraph_cache_hits_total {}

# HELP scopegraph_cache_misses_total Expansion cache misses
# TYPE scopegraph_cache_misses_total counter
scopegraph_cache_misses_total {}

# HELP scopegraph_errors_total Failed reloads
# TYPE scopegraph_errors_total counter
scopegraph_errors_total {}
"#,
            metrics.rebuilds,
            metrics.client_reloads,
            metrics.last_build_ms / 1000.0,
            metrics.roles,
            metrics.clients,
            metrics.pool_entries,
            metrics.states,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.error_count,
        )
    }
}
