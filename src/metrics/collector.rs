//! Cluster metrics using prometheus-client.
//!
//! Tracks topology size, election and failover outcomes, and health-probe
//! results.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Labels for election metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ElectionLabels {
    pub outcome: ElectionOutcome,
}

/// Result of one election.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ElectionOutcome {
    Elected,
    NoCandidate,
}

/// Labels for failover metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailoverLabels {
    pub outcome: FailoverOutcome,
}

/// How a failover attempt ended.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FailoverOutcome {
    /// A node in the session's failover domain took over.
    InDomain,
    /// The session migrated outside its domain.
    Migrated,
    /// Sticky sessions are forced; the request was failed instead.
    Refused,
    /// No candidate anywhere.
    NoCandidate,
}

/// Labels for health-probe metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub result: ProbeResult,
}

/// Result of a health probe.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ProbeResult {
    Success,
    Failure,
}

/// Collects and stores all cluster metrics.
#[derive(Clone)]
pub struct ClusterMetrics {
    inner: Arc<ClusterMetricsInner>,
}

struct ClusterMetricsInner {
    /// Election attempts by outcome.
    elections_total: Family<ElectionLabels, Counter>,
    /// Failover attempts by outcome.
    failovers_total: Family<FailoverLabels, Counter>,
    /// Health probes by result.
    health_checks_total: Family<ProbeLabels, Counter>,
    /// Currently registered nodes.
    nodes: Gauge,
    /// Currently registered contexts.
    contexts: Gauge,
    /// The prometheus registry.
    registry: Registry,
}

impl ClusterMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let elections_total = Family::<ElectionLabels, Counter>::default();
        let failovers_total = Family::<FailoverLabels, Counter>::default();
        let health_checks_total = Family::<ProbeLabels, Counter>::default();
        let nodes = Gauge::default();
        let contexts = Gauge::default();

        registry.register(
            "rustmc_elections",
            "Total number of node elections",
            elections_total.clone(),
        );
        registry.register(
            "rustmc_failovers",
            "Total number of sticky-session failover attempts",
            failovers_total.clone(),
        );
        registry.register(
            "rustmc_health_checks",
            "Total number of health probes performed",
            health_checks_total.clone(),
        );
        registry.register("rustmc_nodes", "Number of registered nodes", nodes.clone());
        registry.register(
            "rustmc_contexts",
            "Number of registered contexts",
            contexts.clone(),
        );

        Self {
            inner: Arc::new(ClusterMetricsInner {
                elections_total,
                failovers_total,
                health_checks_total,
                nodes,
                contexts,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record an election attempt.
    pub fn record_election(&self, elected: bool) {
        let labels = ElectionLabels {
            outcome: if elected {
                ElectionOutcome::Elected
            } else {
                ElectionOutcome::NoCandidate
            },
        };
        self.inner.elections_total.get_or_create(&labels).inc();
    }

    /// Record a failover attempt.
    pub fn record_failover(&self, outcome: FailoverOutcome) {
        let labels = FailoverLabels { outcome };
        self.inner.failovers_total.get_or_create(&labels).inc();
    }

    /// Record a health-probe result.
    pub fn record_health_check(&self, success: bool) {
        let labels = ProbeLabels {
            result: if success {
                ProbeResult::Success
            } else {
                ProbeResult::Failure
            },
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }

    /// A node joined the topology.
    pub fn node_registered(&self) {
        self.inner.nodes.inc();
    }

    /// A node left the topology.
    pub fn node_removed(&self) {
        self.inner.nodes.dec();
    }

    /// A context was registered.
    pub fn context_registered(&self) {
        self.inner.contexts.inc();
    }

    /// A context was unregistered.
    pub fn context_removed(&self) {
        self.inner.contexts.dec();
    }
}

impl Default for ClusterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
