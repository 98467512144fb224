//! Cluster membership, routing tables, and node election.

mod balancer;
mod container;
mod context;
mod elector;
mod failover;
mod node;
mod target;
mod virtual_host;

pub use balancer::{Balancer, BalancerBuilder};
pub use container::{ClusterError, ModClusterContainer};
pub(crate) use container::WeakContainer;
pub use context::{Context, ContextState};
pub use elector::elect_node;
pub use failover::FailoverDomainCache;
pub use node::{Node, NodeConfig, NodeConfigBuilder, NodeStatus};
pub use target::{extract_jvm_route, ProxyTarget};
pub use virtual_host::{HostEntry, VirtualHost};
