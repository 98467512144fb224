//! Periodic cluster maintenance tasks.

use crate::cluster::{Node, WeakContainer};
use crate::health::NodeHealthChecker;
use crate::metrics::ClusterMetrics;
use crate::util::{CancelKey, PeriodicTask};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Probes every node pinned to one I/O thread, once per tick.
///
/// Created lazily when the first node lands on a thread and cancelled when
/// the last one leaves. Probe outcomes feed the node's failure budget; a
/// node that exhausts the budget is removed through the container.
pub(crate) struct HealthCheckTask {
    /// Consecutive failures after which a node is removed; -1 disables.
    threshold: i64,
    checker: Arc<dyn NodeHealthChecker>,
    container: WeakContainer,
    metrics: ClusterMetrics,
    nodes: Mutex<Vec<Arc<Node>>>,
    cancel: Mutex<Option<CancelKey>>,
}

impl HealthCheckTask {
    pub(crate) fn new(
        threshold: i64,
        checker: Arc<dyn NodeHealthChecker>,
        container: WeakContainer,
        metrics: ClusterMetrics,
    ) -> Self {
        Self {
            threshold,
            checker,
            container,
            metrics,
            nodes: Mutex::new(Vec::new()),
            cancel: Mutex::new(None),
        }
    }

    pub(crate) fn add_node(&self, node: Arc<Node>) {
        self.nodes.lock().push(node);
    }

    pub(crate) fn remove_node(&self, node: &Arc<Node>) {
        self.nodes.lock().retain(|n| !Arc::ptr_eq(n, node));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub(crate) fn set_cancel_key(&self, key: CancelKey) {
        *self.cancel.lock() = Some(key);
    }

    pub(crate) fn cancel(&self) {
        if let Some(key) = self.cancel.lock().take() {
            key.cancel();
        }
    }
}

#[async_trait]
impl PeriodicTask for HealthCheckTask {
    async fn run(&self) {
        // Probe a snapshot; the list may change under the container lock
        // while probes are in flight.
        let nodes = self.nodes.lock().clone();
        for node in nodes {
            if node.is_removed() {
                continue;
            }
            let healthy = self.checker.check(&node).await;
            self.metrics.record_health_check(healthy);
            if healthy {
                if node.record_probe_success() {
                    info!(jvm_route = %node.jvm_route(), "node recovered");
                }
            } else {
                let failures = node.record_probe_failure();
                warn!(jvm_route = %node.jvm_route(), failures, "health check failed");
                if self.threshold > 0 && i64::from(failures) >= self.threshold {
                    if let Some(container) = self.container.upgrade() {
                        warn!(
                            jvm_route = %node.jvm_route(),
                            "node exhausted its failure budget, removing"
                        );
                        container.remove_node_if_broken(&node);
                    }
                }
            }
        }
    }
}

/// Folds every node's election count into its baseline each interval, so a
/// node's recent-election disadvantage decays instead of growing without
/// bound.
pub(crate) struct UpdateLoadTask {
    container: WeakContainer,
}

impl UpdateLoadTask {
    pub(crate) fn new(container: WeakContainer) -> Self {
        Self { container }
    }
}

#[async_trait]
impl PeriodicTask for UpdateLoadTask {
    async fn run(&self) {
        let Some(container) = self.container.upgrade() else {
            return;
        };
        for node in container.nodes() {
            node.reset_elected();
        }
    }
}
