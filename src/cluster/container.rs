//! The cluster container: topology ownership, request routing, and the
//! management mutation API.

use crate::cluster::{
    elect_node, extract_jvm_route, Balancer, BalancerBuilder, Context, FailoverDomainCache,
    HostEntry, Node, NodeConfig, ProxyTarget, VirtualHost,
};
use crate::config::ModClusterConfig;
use crate::health::{HealthCheckTask, NodeHealthChecker, UpdateLoadTask};
use crate::metrics::{ClusterMetrics, FailoverOutcome};
use crate::proxy::{exchange, ProxyClient};
use crate::util::{BufferPool, CancelKey, IoThread, PeriodicTask};
use arc_swap::ArcSwap;
use http::Request;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Management command failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// The referenced jvmRoute has no live node.
    #[error("no node registered for jvm route '{0}'")]
    NodeUnknown(String),

    /// A different worker holds the route and is healthy. The wire layer
    /// replies MNODERM for this.
    #[error("jvm route '{jvm_route}' is held by a healthy node at {existing_uri}")]
    NodeConflict {
        jvm_route: String,
        existing_uri: String,
    },

    /// The node exists but has no context registered at the path.
    #[error("no context registered at '{path}' on node '{jvm_route}'")]
    ContextUnknown { jvm_route: String, path: String },
}

/// Owns the cluster topology and answers routing queries against it.
///
/// Lookups (`find_target`, election, failover) read atomic snapshots of the
/// topology maps and never contend with the management side. Mutations are
/// serialized on one internal lock, mutate copies of the maps, and publish
/// them atomically; a command's effects become visible all at once.
///
/// Cloning is cheap and shares the container.
#[derive(Clone)]
pub struct ModClusterContainer {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    // The registered nodes, keyed by jvmRoute.
    nodes: ArcSwap<HashMap<String, Arc<Node>>>,

    // The configured balancers, keyed by name.
    balancers: ArcSwap<HashMap<String, Arc<Balancer>>>,

    // Virtual-host -> per-context balancing table, keyed by alias.
    hosts: ArcSwap<HashMap<String, Arc<VirtualHost>>>,

    // Failover-domain hints for removed routes.
    failover_domains: FailoverDomainCache,

    // Serialized mutation section: scheduled tasks and the write lock.
    scheduler: Mutex<SchedulerState>,

    health_checker: Arc<dyn NodeHealthChecker>,
    health_check_interval: Duration,
    /// Failed probes before a broken node is removed; -1 disables removal.
    remove_broken_threshold: i64,
    metrics: ClusterMetrics,
}

struct SchedulerState {
    /// One health-check task per I/O thread with nodes, keyed by thread id.
    health_checks: HashMap<usize, Arc<HealthCheckTask>>,
    /// Cancel key of the periodic load reset, while any node is registered.
    update_load: Option<CancelKey>,
}

/// Weak handle for the periodic tasks, which must not keep the container
/// alive.
#[derive(Clone)]
pub(crate) struct WeakContainer {
    inner: Weak<ContainerInner>,
}

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<ModClusterContainer> {
        self.inner
            .upgrade()
            .map(|inner| ModClusterContainer { inner })
    }
}

impl ModClusterContainer {
    /// Create a container with an explicit health-checker strategy.
    pub fn new(config: &ModClusterConfig, health_checker: Arc<dyn NodeHealthChecker>) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                nodes: ArcSwap::from_pointee(HashMap::new()),
                balancers: ArcSwap::from_pointee(HashMap::new()),
                hosts: ArcSwap::from_pointee(HashMap::new()),
                failover_domains: FailoverDomainCache::new(
                    config.failover_cache.capacity,
                    config.failover_cache.ttl,
                ),
                scheduler: Mutex::new(SchedulerState {
                    health_checks: HashMap::new(),
                    update_load: None,
                }),
                health_checker,
                health_check_interval: config.health_check_interval,
                remove_broken_threshold: remove_threshold(
                    config.health_check_interval,
                    config.remove_broken_nodes,
                ),
                metrics: ClusterMetrics::new(),
            }),
        }
    }

    /// Create a container with the health checker described by the
    /// configuration.
    pub fn from_config(config: &ModClusterConfig) -> Self {
        let checker = config.health_check.build_checker();
        Self::new(config, checker)
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn metrics(&self) -> &ClusterMetrics {
        &self.inner.metrics
    }

    /// The node registered for a jvmRoute.
    pub fn node(&self, jvm_route: &str) -> Option<Arc<Node>> {
        self.inner.nodes.load().get(jvm_route).cloned()
    }

    /// Snapshot of all registered nodes.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner.nodes.load().values().cloned().collect()
    }

    /// The balancer registered under a name.
    pub fn balancer(&self, name: &str) -> Option<Arc<Balancer>> {
        self.inner.balancers.load().get(name).cloned()
    }

    /// Snapshot of all configured balancers.
    pub fn balancers(&self) -> Vec<Arc<Balancer>> {
        self.inner.balancers.load().values().cloned().collect()
    }

    /// The routing table of one virtual-host alias.
    pub fn virtual_host(&self, alias: &str) -> Option<Arc<VirtualHost>> {
        self.inner.hosts.load().get(alias).cloned()
    }

    /// All registered virtual-host aliases.
    pub fn virtual_host_aliases(&self) -> Vec<String> {
        self.inner.hosts.load().keys().cloned().collect()
    }

    /// The cached failover domain of a removed route, if still remembered.
    pub fn cached_failover_domain(&self, jvm_route: &str) -> Option<String> {
        self.inner.failover_domains.get(jvm_route)
    }

    /// Number of live health-check tasks (at most one per I/O thread).
    pub fn health_check_task_count(&self) -> usize {
        self.inner.scheduler.lock().health_checks.len()
    }

    /// Total node registrations across all health-check tasks.
    pub fn health_checked_node_count(&self) -> usize {
        self.inner
            .scheduler
            .lock()
            .health_checks
            .values()
            .map(|task| task.node_count())
            .sum()
    }

    // ---- routing ----------------------------------------------------------

    /// Map a request to a proxy target.
    ///
    /// Resolves the virtual host from the Host header (lowercased, port
    /// stripped, falling back to the raw value for bracketed IPv6 hosts),
    /// matches the request path, then scans the sticky balancers for a
    /// session route in the cookies or matrix path parameters. The body
    /// type is irrelevant; only headers and URI are read.
    pub fn find_target<B>(&self, request: &Request<B>) -> Option<ProxyTarget> {
        let entry = self.map_virtual_host(request)?;

        let balancers = self.inner.balancers.load();
        for balancer in balancers.values() {
            if !balancer.is_sticky_session() {
                continue;
            }
            if let Some(value) =
                exchange::cookie_value(request.headers(), balancer.sticky_session_cookie())
            {
                if let Some(route) = extract_jvm_route(value) {
                    return Some(ProxyTarget::ExistingSession {
                        jvm_route: route.to_string(),
                        entry,
                        force_sticky: balancer.is_sticky_session_force(),
                    });
                }
            }
            if let Some(id) =
                exchange::path_parameter(request.uri().path(), balancer.sticky_session_path())
            {
                if let Some(route) = extract_jvm_route(id) {
                    return Some(ProxyTarget::ExistingSession {
                        jvm_route: route.to_string(),
                        entry,
                        force_sticky: balancer.is_sticky_session_force(),
                    });
                }
            }
        }
        Some(ProxyTarget::Basic { entry })
    }

    fn map_virtual_host<B>(&self, request: &Request<B>) -> Option<HostEntry> {
        let host_header = exchange::request_host(request.headers())?;
        let hosts = self.inner.hosts.load();
        let name = host_header.to_ascii_lowercase();
        let host = match name.find(':') {
            // Strip the port; an alias with a literal colon (bracketed
            // IPv6) is found through the unstripped fallback.
            Some(colon) if colon > 0 => hosts
                .get(&name[..colon])
                .or_else(|| hosts.get(name.as_str())),
            _ => hosts.get(name.as_str()),
        }?;
        let path = exchange::strip_path_parameters(request.uri().path());
        host.match_path(path.as_ref()).cloned()
    }

    /// Elect a node for a request without session affinity.
    pub fn find_new_node(&self, entry: &HostEntry) -> Option<Arc<Context>> {
        let elected = elect_node(entry.contexts(), false, None);
        self.inner.metrics.record_election(elected.is_some());
        elected
    }

    /// Find a node taking over an orphaned sticky session.
    ///
    /// The failover domain is the caller's, else the live node's, else the
    /// cached one. An in-domain candidate wins; without one the session
    /// either fails (`force_sticky`) or migrates to any available node.
    pub fn find_failover_node(
        &self,
        entry: &HostEntry,
        domain: Option<&str>,
        jvm_route: &str,
        force_sticky: bool,
    ) -> Option<Arc<Context>> {
        let failover_domain = match domain {
            Some(domain) => Some(domain.to_string()),
            None => self
                .node(jvm_route)
                .and_then(|node| node.domain().map(str::to_string))
                .or_else(|| self.inner.failover_domains.get(jvm_route)),
        };
        if let Some(domain) = &failover_domain {
            if let Some(context) = elect_node(entry.contexts(), true, Some(domain)) {
                self.inner.metrics.record_failover(FailoverOutcome::InDomain);
                return Some(context);
            }
        }
        if force_sticky {
            warn!(
                jvm_route,
                "sticky node gone and sticky sessions are forced, failing request"
            );
            self.inner.metrics.record_failover(FailoverOutcome::Refused);
            return None;
        }
        let elected = elect_node(entry.contexts(), false, None);
        self.inner.metrics.record_failover(if elected.is_some() {
            FailoverOutcome::Migrated
        } else {
            FailoverOutcome::NoCandidate
        });
        elected
    }

    // ---- management -------------------------------------------------------

    /// Register a node (the CONFIG command).
    ///
    /// Re-registration under the same jvmRoute and connection URI resets
    /// the existing node's health state. A different URI is a conflict
    /// while the holder is healthy; once the holder is in ERROR it is
    /// removed and the new node takes the route.
    pub fn add_node(
        &self,
        config: NodeConfig,
        balancer_builder: BalancerBuilder,
        io_thread: IoThread,
        buffer_pool: BufferPool,
    ) -> Result<(), ClusterError> {
        let mut scheduler = self.inner.scheduler.lock();

        let jvm_route = config.jvm_route().to_string();
        if let Some(existing) = self.inner.nodes.load().get(&jvm_route).cloned() {
            if existing.connection_uri() == config.connection_uri() {
                existing.reset_state();
                debug!(jvm_route = %jvm_route, "node re-registered, health state reset");
                return Ok(());
            }
            if !existing.is_in_error() {
                return Err(ClusterError::NodeConflict {
                    jvm_route,
                    existing_uri: existing.connection_uri().to_string(),
                });
            }
            // The holder is broken; replace it.
            self.remove_node_locked(&existing, &mut scheduler);
        }

        let balancer_name = config.balancer().to_string();
        let balancer = match self.inner.balancers.load().get(&balancer_name).cloned() {
            Some(balancer) => balancer,
            None => {
                let balancer = Arc::new(balancer_builder.build());
                let mut balancers = HashMap::clone(&self.inner.balancers.load());
                balancers.insert(balancer_name, Arc::clone(&balancer));
                self.inner.balancers.store(Arc::new(balancers));
                balancer
            }
        };

        let node = Arc::new(Node::new(config, balancer, io_thread, buffer_pool));
        let mut nodes = HashMap::clone(&self.inner.nodes.load());
        nodes.insert(jvm_route.clone(), Arc::clone(&node));
        self.inner.nodes.store(Arc::new(nodes));

        self.schedule_health_check(&node, &mut scheduler);
        if scheduler.update_load.is_none() {
            let task: Arc<dyn PeriodicTask> = Arc::new(UpdateLoadTask::new(self.downgrade()));
            scheduler.update_load = Some(
                node.io_thread()
                    .execute_at_interval(task, self.inner.health_check_interval),
            );
        }
        // The route is live again; drop any failover hint for it.
        self.inner.failover_domains.remove(&jvm_route);
        self.inner.metrics.node_registered();
        info!(jvm_route = %jvm_route, uri = %node.connection_uri(), "registering node");
        Ok(())
    }

    /// Remove a node by route (the REMOVE management path).
    pub fn remove_node(&self, jvm_route: &str) -> Option<Arc<Node>> {
        let mut scheduler = self.inner.scheduler.lock();
        let node = self.inner.nodes.load().get(jvm_route).cloned();
        if let Some(node) = &node {
            self.remove_node_locked(node, &mut scheduler);
        }
        node
    }

    /// Remove a node that exhausted its probe-failure budget; no-op unless
    /// it is in ERROR.
    pub(crate) fn remove_node_if_broken(&self, node: &Arc<Node>) {
        let mut scheduler = self.inner.scheduler.lock();
        if !node.is_in_error() {
            return;
        }
        self.remove_node_locked(node, &mut scheduler);
    }

    fn remove_node_locked(&self, node: &Arc<Node>, scheduler: &mut SchedulerState) {
        node.mark_removed();
        let jvm_route = node.jvm_route();
        // Only drop the map entry while it still points at this instance;
        // the route may already have been taken over.
        let is_current = self
            .inner
            .nodes
            .load()
            .get(jvm_route)
            .is_some_and(|current| Arc::ptr_eq(current, node));
        if is_current {
            let mut nodes = HashMap::clone(&self.inner.nodes.load());
            nodes.remove(jvm_route);
            self.inner.nodes.store(Arc::new(nodes));
            info!(jvm_route = %jvm_route, "removing node");

            self.remove_health_check(node, scheduler);
            for context in node.contexts() {
                self.remove_context_for_node(context.path(), node);
            }
            if let Some(domain) = node.domain() {
                self.inner.failover_domains.add(jvm_route, domain);
            }

            // Drop the balancer with its last node.
            let balancer_name = node.balancer().name();
            let still_referenced = self
                .inner
                .nodes
                .load()
                .values()
                .any(|other| other.balancer().name() == balancer_name);
            if !still_referenced {
                let mut balancers = HashMap::clone(&self.inner.balancers.load());
                balancers.remove(balancer_name);
                self.inner.balancers.store(Arc::new(balancers));
            }
            self.inner.metrics.node_removed();
        }
        // The load reset only runs while nodes are registered.
        if self.inner.nodes.load().is_empty() {
            if let Some(key) = scheduler.update_load.take() {
                key.cancel();
            }
        }
    }

    /// Enable every context on a node (ENABLE-NODE).
    pub fn enable_node(&self, jvm_route: &str) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        for context in node.contexts() {
            context.enable();
        }
        Ok(())
    }

    /// Disable every context on a node (DISABLE-NODE).
    pub fn disable_node(&self, jvm_route: &str) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        for context in node.contexts() {
            context.disable();
        }
        Ok(())
    }

    /// Stop every context on a node (STOP-NODE).
    pub fn stop_node(&self, jvm_route: &str) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        for context in node.contexts() {
            context.stop();
        }
        Ok(())
    }

    /// Apply a STATUS load report.
    pub fn update_load(&self, jvm_route: &str, load: i32) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        node.set_load_factor(load);
        debug!(jvm_route, load, "load factor updated");
        Ok(())
    }

    /// Register a context for a node, or enable it if already registered
    /// (ENABLE-APP).
    pub fn enable_context(
        &self,
        path: &str,
        jvm_route: &str,
        aliases: &[String],
    ) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        let context = match node.context(path) {
            Some(context) => context,
            None => {
                let aliases: Vec<String> =
                    aliases.iter().map(|a| a.to_ascii_lowercase()).collect();
                let context = node.register_context(path, aliases.clone());
                info!(path, jvm_route, ?aliases, "registering context");
                let mut hosts = HashMap::clone(&self.inner.hosts.load());
                for alias in &aliases {
                    let host = hosts.entry(alias.clone()).or_default();
                    Arc::make_mut(host).register_context(path, Arc::clone(&context));
                }
                self.inner.hosts.store(Arc::new(hosts));
                self.inner.metrics.context_registered();
                context
            }
        };
        context.enable();
        Ok(())
    }

    /// Disable a context (DISABLE-APP): no new sessions, existing ones
    /// keep going.
    pub fn disable_context(&self, path: &str, jvm_route: &str) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        let context = self.require_context(&node, path)?;
        context.disable();
        Ok(())
    }

    /// Stop a context (STOP-APP); returns the number of requests still in
    /// flight.
    pub fn stop_context(&self, path: &str, jvm_route: &str) -> Result<usize, ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        let context = self.require_context(&node, path)?;
        Ok(context.stop())
    }

    /// Unregister a context (REMOVE-APP).
    pub fn remove_context(&self, path: &str, jvm_route: &str) -> Result<(), ClusterError> {
        let _scheduler = self.inner.scheduler.lock();
        let node = self.require_node(jvm_route)?;
        if self.remove_context_for_node(path, &node) {
            Ok(())
        } else {
            Err(ClusterError::ContextUnknown {
                jvm_route: jvm_route.to_string(),
                path: path.to_string(),
            })
        }
    }

    /// Detach a context from its node and every virtual-host alias.
    ///
    /// Callers hold the mutation lock. The context is stopped so requests
    /// with existing sessions can drain through snapshots that still
    /// reference it, and destroyed once idle.
    fn remove_context_for_node(&self, path: &str, node: &Arc<Node>) -> bool {
        let Some(context) = node.remove_context(path) else {
            return false;
        };
        info!(path, jvm_route = %node.jvm_route(), "unregistering context");
        let pending = context.stop();
        if pending == 0 {
            context.mark_removed();
        }

        let mut hosts = HashMap::clone(&self.inner.hosts.load());
        for alias in context.virtual_hosts() {
            let now_empty = match hosts.get_mut(alias) {
                Some(host) => {
                    let host = Arc::make_mut(host);
                    host.remove_context(path, &context);
                    host.is_empty()
                }
                None => false,
            };
            if now_empty {
                hosts.remove(alias);
            }
        }
        self.inner.hosts.store(Arc::new(hosts));
        self.inner.metrics.context_removed();
        true
    }

    fn require_node(&self, jvm_route: &str) -> Result<Arc<Node>, ClusterError> {
        self.node(jvm_route)
            .ok_or_else(|| ClusterError::NodeUnknown(jvm_route.to_string()))
    }

    fn require_context(
        &self,
        node: &Arc<Node>,
        path: &str,
    ) -> Result<Arc<Context>, ClusterError> {
        node.context(path).ok_or_else(|| ClusterError::ContextUnknown {
            jvm_route: node.jvm_route().to_string(),
            path: path.to_string(),
        })
    }

    // ---- health-check scheduling ------------------------------------------

    fn schedule_health_check(&self, node: &Arc<Node>, scheduler: &mut SchedulerState) {
        let thread_id = node.io_thread().id();
        let task = match scheduler.health_checks.get(&thread_id) {
            Some(task) => Arc::clone(task),
            None => {
                let task = Arc::new(HealthCheckTask::new(
                    self.inner.remove_broken_threshold,
                    Arc::clone(&self.inner.health_checker),
                    self.downgrade(),
                    self.inner.metrics.clone(),
                ));
                let key = node.io_thread().execute_at_interval(
                    Arc::clone(&task) as Arc<dyn PeriodicTask>,
                    self.inner.health_check_interval,
                );
                task.set_cancel_key(key);
                scheduler.health_checks.insert(thread_id, Arc::clone(&task));
                task
            }
        };
        task.add_node(Arc::clone(node));
    }

    fn remove_health_check(&self, node: &Arc<Node>, scheduler: &mut SchedulerState) {
        let thread_id = node.io_thread().id();
        let Some(task) = scheduler.health_checks.get(&thread_id) else {
            return;
        };
        task.remove_node(node);
        if task.is_empty() {
            if let Some(task) = scheduler.health_checks.remove(&thread_id) {
                task.cancel();
            }
        }
    }
}

impl ProxyClient for ModClusterContainer {
    fn find_target<B>(&self, request: &Request<B>) -> Option<ProxyTarget> {
        ModClusterContainer::find_target(self, request)
    }
}

/// Failed probes a node is allowed before removal, clamped to [1, 1000];
/// -1 when either interval disables removal.
fn remove_threshold(health_check_interval: Duration, remove_broken_nodes: Duration) -> i64 {
    let interval = health_check_interval.as_millis() as i64;
    let window = remove_broken_nodes.as_millis() as i64;
    if interval > 0 && window > 0 {
        (window / interval).clamp(1, 1000)
    } else {
        -1
    }
}
