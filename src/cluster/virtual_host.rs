//! Per-host routing table: context path to candidate contexts.

use crate::cluster::Context;
use std::collections::HashMap;
use std::sync::Arc;

/// Contexts registered for one (alias, path) pair, in registration order.
///
/// Election iterates the contexts in the order they were registered, which
/// keeps tie-breaking deterministic.
#[derive(Clone)]
pub struct HostEntry {
    path: String,
    contexts: Vec<Arc<Context>>,
}

impl HostEntry {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contexts: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contexts(&self) -> &[Arc<Context>] {
        &self.contexts
    }

    /// The context a given node registered here, if any.
    pub fn context_for_node(&self, jvm_route: &str) -> Option<Arc<Context>> {
        self.contexts
            .iter()
            .find(|context| {
                context
                    .node()
                    .is_some_and(|node| node.jvm_route() == jvm_route)
            })
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl std::fmt::Debug for HostEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEntry")
            .field("path", &self.path)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// Path table for one virtual-host alias.
///
/// Mutated only under the container lock by cloning the current value and
/// republishing, so request-path lookups always see a consistent table.
#[derive(Clone, Default)]
pub struct VirtualHost {
    paths: HashMap<String, HostEntry>,
}

impl VirtualHost {
    /// Longest-prefix match of a request path against the registered
    /// context paths, with prefix boundaries at `/`.
    pub fn match_path(&self, path: &str) -> Option<&HostEntry> {
        if let Some(entry) = self.paths.get(path) {
            return Some(entry);
        }
        let mut prefix = path;
        while let Some(slash) = prefix.rfind('/') {
            prefix = &prefix[..slash];
            if prefix.is_empty() {
                break;
            }
            if let Some(entry) = self.paths.get(prefix) {
                return Some(entry);
            }
        }
        self.paths.get("/")
    }

    pub(crate) fn register_context(&mut self, path: &str, context: Arc<Context>) {
        self.paths
            .entry(path.to_string())
            .or_insert_with(|| HostEntry::new(path))
            .contexts
            .push(context);
    }

    /// Withdraw one node's context from a path; drops the entry when it was
    /// the last context registered there.
    pub(crate) fn remove_context(&mut self, path: &str, context: &Arc<Context>) {
        let Some(entry) = self.paths.get_mut(path) else {
            return;
        };
        entry.contexts.retain(|c| !Arc::ptr_eq(c, context));
        if entry.is_empty() {
            self.paths.remove(path);
        }
    }

    /// Iterate the registered path entries.
    pub fn entries(&self) -> impl Iterator<Item = &HostEntry> {
        self.paths.values()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}
