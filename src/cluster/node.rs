//! Backend worker node: configuration, health state, and election counters.

use crate::cluster::{Balancer, Context};
use crate::util::{BufferPool, IoThread};
use http::Uri;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

const STATUS_OK: u8 = 0;
const STATUS_ERROR: u8 = 1;
const STATUS_REMOVED: u8 = 2;

/// Health state of a node.
///
/// Hot-standby is a configuration flag orthogonal to this. `Removed` is
/// terminal: a node is never revived, re-registration creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Ok,
    Error,
    Removed,
}

impl NodeStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATUS_OK => NodeStatus::Ok,
            STATUS_ERROR => NodeStatus::Error,
            _ => NodeStatus::Removed,
        }
    }
}

/// Static configuration of a worker node, delivered by the CONFIG command.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    jvm_route: String,
    connection_uri: Uri,
    balancer: String,
    domain: Option<String>,
    hot_standby: bool,
}

impl NodeConfig {
    pub fn builder(jvm_route: impl Into<String>, connection_uri: Uri) -> NodeConfigBuilder {
        NodeConfigBuilder::new(jvm_route, connection_uri)
    }

    /// Unique identifier of the worker; also the session-id route suffix.
    pub fn jvm_route(&self) -> &str {
        &self.jvm_route
    }

    /// Scheme, host and port the forwarder connects to.
    pub fn connection_uri(&self) -> &Uri {
        &self.connection_uri
    }

    pub fn balancer(&self) -> &str {
        &self.balancer
    }

    /// Failover group tag, if the worker belongs to one.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn is_hot_standby(&self) -> bool {
        self.hot_standby
    }
}

/// Builder for [`NodeConfig`].
#[derive(Debug, Clone)]
pub struct NodeConfigBuilder {
    jvm_route: String,
    connection_uri: Uri,
    balancer: String,
    domain: Option<String>,
    hot_standby: bool,
}

impl NodeConfigBuilder {
    pub fn new(jvm_route: impl Into<String>, connection_uri: Uri) -> Self {
        Self {
            jvm_route: jvm_route.into(),
            connection_uri,
            balancer: "mycluster".to_string(),
            domain: None,
            hot_standby: false,
        }
    }

    pub fn balancer(mut self, balancer: impl Into<String>) -> Self {
        self.balancer = balancer.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn hot_standby(mut self, hot_standby: bool) -> Self {
        self.hot_standby = hot_standby;
        self
    }

    pub fn build(self) -> NodeConfig {
        NodeConfig {
            jvm_route: self.jvm_route,
            connection_uri: self.connection_uri,
            balancer: self.balancer,
            domain: self.domain,
            hot_standby: self.hot_standby,
        }
    }
}

/// A registered worker.
///
/// Counters are written from the election path or the node's pinned I/O
/// thread and read lock-free by the routing path, so everything mutable is
/// atomic; the context list only changes under the container mutation lock.
pub struct Node {
    config: NodeConfig,
    balancer: Arc<Balancer>,
    io_thread: IoThread,
    buffer_pool: BufferPool,
    status: AtomicU8,
    /// I/O and probe failures since the last successful probe.
    io_error_count: AtomicU32,
    elected_count: AtomicU64,
    old_elected: AtomicU64,
    /// Capacity hint from STATUS, 1..=100; -1 until the first report.
    load_factor: AtomicI32,
    contexts: Mutex<Vec<Arc<Context>>>,
}

impl Node {
    pub(crate) fn new(
        config: NodeConfig,
        balancer: Arc<Balancer>,
        io_thread: IoThread,
        buffer_pool: BufferPool,
    ) -> Self {
        Self {
            config,
            balancer,
            io_thread,
            buffer_pool,
            status: AtomicU8::new(STATUS_OK),
            io_error_count: AtomicU32::new(0),
            elected_count: AtomicU64::new(0),
            old_elected: AtomicU64::new(0),
            load_factor: AtomicI32::new(-1),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn jvm_route(&self) -> &str {
        &self.config.jvm_route
    }

    pub fn connection_uri(&self) -> &Uri {
        &self.config.connection_uri
    }

    pub fn domain(&self) -> Option<&str> {
        self.config.domain()
    }

    pub fn is_hot_standby(&self) -> bool {
        self.config.hot_standby
    }

    pub fn balancer(&self) -> &Arc<Balancer> {
        &self.balancer
    }

    pub fn io_thread(&self) -> &IoThread {
        &self.io_thread
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    pub fn is_in_error(&self) -> bool {
        self.status() == NodeStatus::Error
    }

    pub fn is_removed(&self) -> bool {
        self.status() == NodeStatus::Removed
    }

    /// Terminal transition; wins over any concurrent health update.
    pub(crate) fn mark_removed(&self) {
        self.status.store(STATUS_REMOVED, Ordering::Release);
    }

    /// OK -> ERROR. Removed stays removed.
    pub(crate) fn mark_in_error(&self) {
        let _ = self.status.compare_exchange(
            STATUS_OK,
            STATUS_ERROR,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Reset health bookkeeping on idempotent re-registration.
    pub(crate) fn reset_state(&self) {
        self.io_error_count.store(0, Ordering::Relaxed);
        let _ = self.status.compare_exchange(
            STATUS_ERROR,
            STATUS_OK,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Record a successful health probe.
    ///
    /// Clears the failure budget; returns true when this flipped the node
    /// back from ERROR to OK.
    pub(crate) fn record_probe_success(&self) -> bool {
        self.io_error_count.store(0, Ordering::Relaxed);
        self.status
            .compare_exchange(STATUS_ERROR, STATUS_OK, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record a failed health probe; returns the failure count so far.
    pub(crate) fn record_probe_failure(&self) -> u32 {
        self.mark_in_error();
        self.io_error_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Report a proxying I/O error against this node.
    ///
    /// Failures reported here count against the same budget the health-check
    /// task enforces; a successful probe clears them.
    pub fn record_io_error(&self) {
        self.io_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn io_error_count(&self) -> u32 {
        self.io_error_count.load(Ordering::Relaxed)
    }

    /// Count a won election.
    pub(crate) fn elected(&self) {
        self.elected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn elected_count(&self) -> u64 {
        self.elected_count.load(Ordering::Relaxed)
    }

    /// Elections won since the last load-reset tick.
    pub fn elected_diff(&self) -> u64 {
        let elected = self.elected_count.load(Ordering::Relaxed);
        let old = self.old_elected.load(Ordering::Relaxed);
        elected.saturating_sub(old)
    }

    /// Fold the current election count into the baseline, decaying the
    /// advantage of nodes that were idle while others served.
    pub(crate) fn reset_elected(&self) {
        self.old_elected
            .store(self.elected_count.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    pub fn load_factor(&self) -> i32 {
        self.load_factor.load(Ordering::Relaxed)
    }

    /// Apply a STATUS report. Values at or below zero take the node out of
    /// new-session rotation.
    pub(crate) fn set_load_factor(&self, load: i32) {
        self.load_factor.store(load.min(100), Ordering::Relaxed);
    }

    /// Remaining capacity estimate; higher is more deserving of the next
    /// request.
    pub fn load_status(&self) -> i32 {
        let load_factor = self.load_factor.load(Ordering::Relaxed);
        if load_factor <= 0 {
            return 0;
        }
        let diff = self.elected_diff() as i64;
        let status = load_factor as i64 - diff * 100 / load_factor as i64;
        status.max(0) as i32
    }

    /// Register a context for `path`, bound to this node.
    pub(crate) fn register_context(
        self: &Arc<Self>,
        path: impl Into<String>,
        aliases: Vec<String>,
    ) -> Arc<Context> {
        let context = Arc::new(Context::new(path, Arc::downgrade(self), aliases));
        self.contexts.lock().push(Arc::clone(&context));
        context
    }

    pub fn context(&self, path: &str) -> Option<Arc<Context>> {
        self.contexts
            .lock()
            .iter()
            .find(|c| c.path() == path)
            .cloned()
    }

    pub(crate) fn remove_context(&self, path: &str) -> Option<Arc<Context>> {
        let mut contexts = self.contexts.lock();
        let index = contexts.iter().position(|c| c.path() == path)?;
        Some(contexts.remove(index))
    }

    /// Snapshot of the node's contexts, in registration order.
    pub fn contexts(&self) -> Vec<Arc<Context>> {
        self.contexts.lock().clone()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("jvm_route", &self.config.jvm_route)
            .field("uri", &self.config.connection_uri)
            .field("status", &self.status())
            .field("load_factor", &self.load_factor())
            .finish()
    }
}
