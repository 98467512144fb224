//! A deployed application path on one node.

use crate::cluster::{Node, NodeStatus};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

const STATE_DISABLED: u8 = 0;
const STATE_ENABLED: u8 = 1;
const STATE_STOPPED: u8 = 2;
const STATE_REMOVED: u8 = 3;

/// Lifecycle of a context.
///
/// New contexts start `Disabled` and are switched on by ENABLE-APP. A
/// `Stopped` context still serves requests that carry one of its sessions
/// until they drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Disabled,
    Enabled,
    Stopped,
    Removed,
}

impl ContextState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_DISABLED => ContextState::Disabled,
            STATE_ENABLED => ContextState::Enabled,
            STATE_STOPPED => ContextState::Stopped,
            _ => ContextState::Removed,
        }
    }
}

/// Binding of a context path to its node and virtual-host aliases.
///
/// The node reference is weak: the node owns its contexts, and a context
/// resolved from a routing snapshot may outlive the node's registration.
pub struct Context {
    path: String,
    node: Weak<Node>,
    virtual_hosts: Vec<String>,
    state: AtomicU8,
    active_requests: AtomicU32,
}

impl Context {
    pub(crate) fn new(path: impl Into<String>, node: Weak<Node>, virtual_hosts: Vec<String>) -> Self {
        Self {
            path: path.into(),
            node,
            virtual_hosts,
            state: AtomicU8::new(STATE_DISABLED),
            active_requests: AtomicU32::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The owning node, while it is still registered.
    pub fn node(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }

    /// Aliases this context is registered under.
    pub fn virtual_hosts(&self) -> &[String] {
        &self.virtual_hosts
    }

    pub fn state(&self) -> ContextState {
        ContextState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn enable(&self) {
        self.transition(STATE_ENABLED);
    }

    pub(crate) fn disable(&self) {
        self.transition(STATE_DISABLED);
    }

    /// Stop the context; returns the number of requests still in flight.
    pub(crate) fn stop(&self) -> usize {
        self.transition(STATE_STOPPED);
        self.active_requests.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn mark_removed(&self) {
        self.state.store(STATE_REMOVED, Ordering::Release);
    }

    fn transition(&self, target: u8) {
        // Removed is terminal.
        let mut current = self.state.load(Ordering::Acquire);
        while current != STATE_REMOVED {
            match self.state.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Whether this context can take a request.
    ///
    /// Stopped contexts keep serving existing sessions until drained; nodes
    /// without a positive load factor only take existing sessions.
    pub fn check_available(&self, existing_session: bool) -> bool {
        let available = match self.state() {
            ContextState::Enabled => true,
            ContextState::Stopped => existing_session,
            ContextState::Disabled | ContextState::Removed => false,
        };
        if !available {
            return false;
        }
        let Some(node) = self.node() else {
            return false;
        };
        if node.status() != NodeStatus::Ok {
            return false;
        }
        if node.load_factor() <= 0 && !existing_session {
            return false;
        }
        true
    }

    /// Track a request handed to this context.
    pub fn begin_request(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Track a request finishing.
    pub fn end_request(&self) {
        let current = self.active_requests.load(Ordering::Relaxed);
        if current > 0 {
            self.active_requests.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed) as usize
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("active_requests", &self.active_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Balancer, NodeConfig};
    use crate::util::{BufferPool, CancelKey, IoThread, PeriodicTask, TaskExecutor};
    use std::time::Duration;

    struct NoopExecutor;

    impl TaskExecutor for NoopExecutor {
        fn execute_at_interval(
            &self,
            _task: Arc<dyn PeriodicTask>,
            _period: Duration,
        ) -> CancelKey {
            CancelKey::new(|| {})
        }
    }

    fn node_with_load(load: i32) -> Arc<Node> {
        let config = NodeConfig::builder("node1", "http://127.0.0.1:8009".parse().unwrap())
            .balancer("web")
            .build();
        let node = Arc::new(Node::new(
            config,
            Arc::new(Balancer::builder("web").build()),
            IoThread::new(0, Arc::new(NoopExecutor)),
            BufferPool::default(),
        ));
        node.set_load_factor(load);
        node
    }

    #[test]
    fn test_lifecycle() {
        let node = node_with_load(100);
        let context = node.register_context("/app", vec!["localhost".to_string()]);

        assert_eq!(context.state(), ContextState::Disabled);
        context.enable();
        assert_eq!(context.state(), ContextState::Enabled);
        context.disable();
        assert_eq!(context.state(), ContextState::Disabled);
        context.stop();
        assert_eq!(context.state(), ContextState::Stopped);

        context.mark_removed();
        context.enable();
        assert_eq!(context.state(), ContextState::Removed);
    }

    #[test]
    fn test_availability() {
        let node = node_with_load(100);
        let context = node.register_context("/app", vec!["localhost".to_string()]);

        // Disabled: never available.
        assert!(!context.check_available(false));
        assert!(!context.check_available(true));

        context.enable();
        assert!(context.check_available(false));

        // Stopped contexts only honor existing sessions.
        context.stop();
        assert!(!context.check_available(false));
        assert!(context.check_available(true));
    }

    #[test]
    fn test_error_node_is_unavailable() {
        let node = node_with_load(100);
        let context = node.register_context("/app", vec!["localhost".to_string()]);
        context.enable();

        node.mark_in_error();
        assert!(!context.check_available(false));
        assert!(!context.check_available(true));
    }

    #[test]
    fn test_disabled_load_factor_only_serves_existing_sessions() {
        let node = node_with_load(-1);
        let context = node.register_context("/app", vec!["localhost".to_string()]);
        context.enable();

        assert!(!context.check_available(false));
        assert!(context.check_available(true));
    }

    #[test]
    fn test_dropped_node_is_unavailable() {
        let node = node_with_load(100);
        let context = node.register_context("/app", vec!["localhost".to_string()]);
        context.enable();
        assert!(context.check_available(false));

        drop(node);
        assert!(!context.check_available(false));
    }

    #[test]
    fn test_request_tracking() {
        let node = node_with_load(100);
        let context = node.register_context("/app", vec!["localhost".to_string()]);

        context.begin_request();
        context.begin_request();
        assert_eq!(context.active_requests(), 2);

        assert_eq!(context.stop(), 2);

        context.end_request();
        context.end_request();
        context.end_request();
        assert_eq!(context.active_requests(), 0);
    }
}
