//! Utility functions and helpers.

mod buffers;
mod logging;
mod scheduler;

pub use buffers::BufferPool;
pub use logging::init_logging;
pub use scheduler::{
    CancelKey, IoThread, IoThreadPool, PeriodicTask, TaskExecutor, TokioExecutor,
};
