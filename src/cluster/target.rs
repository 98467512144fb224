//! Routing resolution: from a matched host entry to a concrete context.

use crate::cluster::{Context, HostEntry, ModClusterContainer};
use std::sync::Arc;

/// Outcome of [`find_target`](crate::cluster::ModClusterContainer::find_target).
///
/// The target is a thunk: it captures the matched host entry and the sticky
/// decision, and the forwarder resolves it to a node only when it is about
/// to connect.
#[derive(Clone)]
pub enum ProxyTarget {
    /// The request carries a session id routed to a known jvmRoute.
    ExistingSession {
        jvm_route: String,
        entry: HostEntry,
        /// Refuse to migrate when the sticky node is unreachable.
        force_sticky: bool,
    },
    /// No session affinity; elect freely.
    Basic { entry: HostEntry },
}

impl ProxyTarget {
    pub fn entry(&self) -> &HostEntry {
        match self {
            ProxyTarget::ExistingSession { entry, .. } => entry,
            ProxyTarget::Basic { entry } => entry,
        }
    }

    /// The sticky route, when the request carried one.
    pub fn jvm_route(&self) -> Option<&str> {
        match self {
            ProxyTarget::ExistingSession { jvm_route, .. } => Some(jvm_route),
            ProxyTarget::Basic { .. } => None,
        }
    }

    /// Resolve to the context the forwarder should connect to.
    ///
    /// A sticky target goes straight to the session's node when it is still
    /// available (no election); otherwise it runs failover selection. A
    /// basic target runs a fresh election.
    pub fn resolve(&self, container: &ModClusterContainer) -> Option<Arc<Context>> {
        match self {
            ProxyTarget::ExistingSession {
                jvm_route,
                entry,
                force_sticky,
            } => {
                if let Some(context) = entry.context_for_node(jvm_route) {
                    if context.check_available(true) {
                        return Some(context);
                    }
                }
                container.find_failover_node(entry, None, jvm_route, *force_sticky)
            }
            ProxyTarget::Basic { entry } => container.find_new_node(entry),
        }
    }
}

impl std::fmt::Debug for ProxyTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyTarget::ExistingSession {
                jvm_route,
                force_sticky,
                ..
            } => f
                .debug_struct("ExistingSession")
                .field("jvm_route", jvm_route)
                .field("force_sticky", force_sticky)
                .finish(),
            ProxyTarget::Basic { .. } => f.debug_struct("Basic").finish(),
        }
    }
}

/// Extract the jvmRoute suffix from a session identifier.
///
/// Session ids look like `SID.route` or `SID.route.versionTag`: the route
/// is whatever sits between the first dot and the next one. No dot, or
/// nothing after it, means no route.
pub fn extract_jvm_route(session_id: &str) -> Option<&str> {
    let dot = session_id.find('.')?;
    let rest = &session_id[dot + 1..];
    let route = match rest.find('.') {
        Some(next) => &rest[..next],
        None => rest,
    };
    if route.is_empty() {
        None
    } else {
        Some(route)
    }
}
