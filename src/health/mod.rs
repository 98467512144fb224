//! Health checking for cluster nodes.

mod checker;
mod task;

pub use checker::{HttpHealthChecker, NodeHealthChecker, NoopHealthChecker, TcpHealthChecker};
pub(crate) use task::{HealthCheckTask, UpdateLoadTask};
