//! Metrics collection.

mod collector;

pub use collector::{
    ClusterMetrics, ElectionLabels, ElectionOutcome, FailoverLabels, FailoverOutcome,
    ProbeLabels, ProbeResult,
};
