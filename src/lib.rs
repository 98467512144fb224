//! rustmc - the cluster core of a mod_cluster-style reverse proxy
//!
//! This crate provides the data plane of a dynamic reverse proxy:
//! - A live topology of worker nodes, registered and withdrawn at runtime
//!   by management commands
//! - Multi-level request routing: virtual host, then context path, then a
//!   weighted node election with sticky sessions, hot standbys, and
//!   failover domains
//! - Per-I/O-thread health checking with automatic removal of broken nodes
//!
//! The wire protocol, the byte-moving forwarder, and TLS live outside this
//! crate; it consumes `http` request types and an injected executor.

pub mod cluster;
pub mod config;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod util;

pub use cluster::{ClusterError, ModClusterContainer, ProxyTarget};
pub use config::ModClusterConfig;
pub use proxy::ProxyClient;
