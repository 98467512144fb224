//! Node election: pick the best context out of a candidate set.

use crate::cluster::{Context, Node};
use std::sync::Arc;

/// Elect a context from `contexts`, in iteration order.
///
/// Rules, applied while scanning once:
/// - contexts failing the availability check are skipped;
/// - with a `domain` filter, nodes outside the domain are skipped;
/// - an active node always beats a hot-standby node;
/// - between hot-standby nodes, the smaller recent election count wins;
/// - between active nodes, the higher load status (more free capacity)
///   wins, first-registered winning ties.
///
/// The winner's election counter is bumped; an empty or fully unavailable
/// candidate set changes nothing and yields `None`.
pub fn elect_node<'a, I>(
    contexts: I,
    existing_session: bool,
    domain: Option<&str>,
) -> Option<Arc<Context>>
where
    I: IntoIterator<Item = &'a Arc<Context>>,
{
    let mut elected: Option<Arc<Context>> = None;
    let mut candidate: Option<Arc<Node>> = None;
    let mut candidate_hot_standby = false;

    for context in contexts {
        if !context.check_available(existing_session) {
            continue;
        }
        let Some(node) = context.node() else {
            continue;
        };
        if let Some(domain) = domain {
            if node.domain() != Some(domain) {
                continue;
            }
        }
        let hot_standby = node.is_hot_standby();
        let replace = match &candidate {
            None => true,
            Some(current) => {
                if candidate_hot_standby {
                    // An active node displaces any standby; between
                    // standbys the least recently loaded one wins.
                    !hot_standby || current.elected_diff() > node.elected_diff()
                } else if hot_standby {
                    false
                } else {
                    node.load_status() > current.load_status()
                }
            }
        };
        if replace {
            candidate_hot_standby = hot_standby;
            candidate = Some(node);
            elected = Some(Arc::clone(context));
        }
    }

    if let Some(winner) = &candidate {
        winner.elected();
    }
    elected
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

    struct TestNode {
        node: Arc<Node>,
        context: Arc<Context>,
    }

    fn make_node(route: &str, load: i32, hot_standby: bool, domain: Option<&str>) -> TestNode {
        let mut builder = NodeConfig::builder(route, "http://127.0.0.1:8009".parse().unwrap())
            .balancer("web")
            .hot_standby(hot_standby);
        if let Some(domain) = domain {
            builder = builder.domain(domain);
        }
        let node = Arc::new(Node::new(
            builder.build(),
            Arc::new(Balancer::builder("web").build()),
            IoThread::new(0, Arc::new(NoopExecutor)),
            BufferPool::default(),
        ));
        node.set_load_factor(load);
        let context = node.register_context("/app", vec!["localhost".to_string()]);
        context.enable();
        TestNode { node, context }
    }

    #[test]
    fn test_empty_candidate_set() {
        let contexts: Vec<Arc<Context>> = Vec::new();
        assert!(elect_node(contexts.iter(), false, None).is_none());
    }

    #[test]
    fn test_single_candidate_wins_and_is_counted() {
        let a = make_node("a", 50, false, None);
        let contexts = vec![Arc::clone(&a.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &a.context));
        assert_eq!(a.node.elected_count(), 1);
    }

    #[test]
    fn test_exactly_one_election_per_call() {
        let a = make_node("a", 50, false, None);
        let b = make_node("b", 50, false, None);
        let contexts = vec![Arc::clone(&a.context), Arc::clone(&b.context)];

        elect_node(contexts.iter(), false, None).unwrap();
        assert_eq!(a.node.elected_count() + b.node.elected_count(), 1);
    }

    #[test]
    fn test_higher_load_status_wins() {
        let a = make_node("a", 10, false, None);
        let b = make_node("b", 100, false, None);
        let contexts = vec![Arc::clone(&a.context), Arc::clone(&b.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &b.context));
    }

    #[test]
    fn test_first_registered_wins_ties() {
        let a = make_node("a", 50, false, None);
        let b = make_node("b", 50, false, None);
        let contexts = vec![Arc::clone(&a.context), Arc::clone(&b.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &a.context));
    }

    #[test]
    fn test_unavailable_candidates_skipped() {
        let a = make_node("a", 100, false, None);
        let b = make_node("b", 10, false, None);
        a.node.mark_in_error();
        let contexts = vec![Arc::clone(&a.context), Arc::clone(&b.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &b.context));
        assert_eq!(a.node.elected_count(), 0);
    }

    #[test]
    fn test_standby_only_serves_when_no_active_node() {
        let active = make_node("a", 50, false, None);
        let standby = make_node("h", 50, true, None);
        let contexts = vec![Arc::clone(&standby.context), Arc::clone(&active.context)];

        // Active beats standby even when the standby comes first.
        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &active.context));

        // Active gone: the standby takes over.
        active.node.mark_in_error();
        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &standby.context));
    }

    #[test]
    fn test_standby_never_displaces_active_incumbent() {
        let active = make_node("a", 50, false, None);
        let standby = make_node("h", 100, true, None);
        let contexts = vec![Arc::clone(&active.context), Arc::clone(&standby.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &active.context));
    }

    #[test]
    fn test_standby_tie_broken_by_recent_elections() {
        let h1 = make_node("h1", 50, true, None);
        let h2 = make_node("h2", 50, true, None);
        h1.node.elected();
        h1.node.elected();
        h2.node.elected();
        let contexts = vec![Arc::clone(&h1.context), Arc::clone(&h2.context)];

        let winner = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&winner, &h2.context));
    }

    #[test]
    fn test_domain_filter() {
        let c = make_node("c", 50, false, Some("d1"));
        let d = make_node("d", 100, false, Some("d2"));
        let contexts = vec![Arc::clone(&c.context), Arc::clone(&d.context)];

        let winner = elect_node(contexts.iter(), true, Some("d1")).unwrap();
        assert!(Arc::ptr_eq(&winner, &c.context));

        assert!(elect_node(contexts.iter(), true, Some("d3")).is_none());
    }

    #[test]
    fn test_election_decays_load_status() {
        let a = make_node("a", 100, false, None);
        let b = make_node("b", 100, false, None);
        let contexts = vec![Arc::clone(&a.context), Arc::clone(&b.context)];

        // With equal status the first candidate wins, pays for it in load
        // status, and the second takes the next call.
        let first = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&first, &a.context));
        let second = elect_node(contexts.iter(), false, None).unwrap();
        assert!(Arc::ptr_eq(&second, &b.context));
    }
}
