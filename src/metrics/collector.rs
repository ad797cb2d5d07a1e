//! Metrics collector using prometheus-client.
//!
//! Provides metrics for request counts, latency, connections, and upstream health.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub upstream: String,
    pub method: String,
    pub status: String,
}

/// Labels for per-upstream metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabels {
    pub upstream: String,
}

/// Labels for health check metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub upstream: String,
    pub result: HealthCheckResult,
}

/// Result of a health check.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HealthCheckResult {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total requests counter.
    requests_total: Family<RequestLabels, Counter>,
    /// Request duration histogram (in seconds).
    request_duration_seconds: Family<UpstreamLabels, Histogram>,
    /// Requests rejected because no upstream was usable.
    unavailable_total: Counter,
    /// Active client connections.
    active_connections: Gauge,
    /// Total client connections accepted.
    connections_total: Counter,
    /// Upstream health gauge (1 = healthy, 0 = unhealthy).
    upstream_health: Family<UpstreamLabels, Gauge>,
    /// Health check results counter.
    health_checks_total: Family<HealthCheckLabels, Counter>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<UpstreamLabels, Histogram>::new_with_constructor(
            || {
                // Buckets: 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
                Histogram::new(exponential_buckets(0.001, 2.5, 13))
            },
        );
        let unavailable_total = Counter::default();
        let active_connections = Gauge::default();
        let connections_total = Counter::default();
        let upstream_health = Family::<UpstreamLabels, Gauge>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();

        registry.register(
            "rrlb_requests",
            "Total number of requests forwarded",
            requests_total.clone(),
        );
        registry.register(
            "rrlb_request_duration_seconds",
            "Request duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "rrlb_unavailable",
            "Requests answered with 503 because no upstream was usable",
            unavailable_total.clone(),
        );
        registry.register(
            "rrlb_active_connections",
            "Number of active client connections",
            active_connections.clone(),
        );
        registry.register(
            "rrlb_connections",
            "Total number of client connections",
            connections_total.clone(),
        );
        registry.register(
            "rrlb_upstream_health",
            "Upstream health status (1=healthy, 0=unhealthy)",
            upstream_health.clone(),
        );
        registry.register(
            "rrlb_health_checks",
            "Total number of health checks performed",
            health_checks_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                unavailable_total,
                active_connections,
                connections_total,
                upstream_health,
                health_checks_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a request that was forwarded to `upstream`.
    pub fn record_request(&self, upstream: &str, method: &str, status: u16, duration: Duration) {
        let labels = RequestLabels {
            upstream: upstream.to_string(),
            method: method.to_string(),
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        let upstream_labels = UpstreamLabels {
            upstream: upstream.to_string(),
        };
        self.inner
            .request_duration_seconds
            .get_or_create(&upstream_labels)
            .observe(duration.as_secs_f64());
    }

    /// Record a request rejected because every upstream was unavailable.
    pub fn record_unavailable(&self) {
        self.inner.unavailable_total.inc();
    }

    /// Increment active connections.
    pub fn connection_opened(&self) {
        self.inner.active_connections.inc();
        self.inner.connections_total.inc();
    }

    /// Decrement active connections.
    pub fn connection_closed(&self) {
        self.inner.active_connections.dec();
    }

    /// Update upstream health status.
    pub fn set_upstream_health(&self, upstream: &str, healthy: bool) {
        let labels = UpstreamLabels {
            upstream: upstream.to_string(),
        };
        self.inner
            .upstream_health
            .get_or_create(&labels)
            .set(if healthy { 1 } else { 0 });
    }

    /// Record a health check result.
    pub fn record_health_check(&self, upstream: &str, success: bool) {
        let labels = HealthCheckLabels {
            upstream: upstream.to_string(),
            result: if success {
                HealthCheckResult::Success
            } else {
                HealthCheckResult::Failure
            },
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
