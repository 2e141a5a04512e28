//! # Process Supervisor
//!
//! Cluster mode: the coordinating process runs a headless kernel and keeps
//! `worker_count` worker processes alive; each worker runs its own full
//! kernel and binds the listener.
//!
//! ```text
//! coordinator (headless kernel)
//!   └── Supervisor
//!         ├── worker 0  (KERNEL_WORKER_SLOT=0, own connections)
//!         ├── worker 1
//!         └── ...
//! ```
//!
//! Workers share no memory. A worker that exits for any reason is handled
//! by the configured [`RestartStrategy`].

mod cluster;
mod launcher;
mod policy;
mod run;

pub use cluster::{ClusterOptions, ClusterRole, Coordinator};
pub use launcher::{
    worker_slot_from_env, WorkerExit, WorkerLauncher, WorkerProcess, WORKER_SLOT_ENV,
};
pub use policy::{BackoffPolicy, Jitter, RestartDecision, RestartStrategy, RestartTracker};
pub use run::{Supervisor, SupervisorHandle, SupervisorStats};

pub(crate) use cluster::start_cluster;

use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch worker {slot}: {reason}")]
    Launch { slot: usize, reason: String },

    #[error("Failed to wait for worker {slot}: {reason}")]
    Wait { slot: usize, reason: String },

    #[error("Failed to stop worker {slot}: {reason}")]
    Kill { slot: usize, reason: String },

    #[error("Cannot locate the worker executable: {0}")]
    Executable(String),

    #[error("Workers restarted {restarts} times within {window:?}, giving up")]
    CrashLoop { restarts: usize, window: Duration },

    #[error("Supervisor task failed: {0}")]
    Join(String),
}

/// `min(available_cpus, limit)`, or `available_cpus` without a limit.
/// Never below one.
pub fn worker_count(available_cpus: usize, limit: Option<NonZeroUsize>) -> usize {
    let count = match limit {
        Some(limit) => available_cpus.min(limit.get()),
        None => available_cpus,
    };
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(8, NonZeroUsize::new(2)), 2);
        assert_eq!(worker_count(2, NonZeroUsize::new(8)), 2);
        assert_eq!(worker_count(8, None), 8);
        assert_eq!(worker_count(0, None), 1);
    }
}
