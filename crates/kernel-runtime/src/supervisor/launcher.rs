//! Worker process ports.

use super::SupervisorError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Environment variable carrying a worker's slot number. Its presence
/// makes a process a worker.
pub const WORKER_SLOT_ENV: &str = "KERNEL_WORKER_SLOT";

/// The worker slot of this process, if it is a worker.
pub fn worker_slot_from_env() -> Option<usize> {
    std::env::var(WORKER_SLOT_ENV).ok()?.trim().parse().ok()
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub uptime: Duration,
}

impl WorkerExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            signal: Some(signal),
            ..Self::default()
        }
    }

    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime = uptime;
        self
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// A launched worker.
#[async_trait]
pub trait WorkerProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Wait for the worker to end.
    async fn wait(&mut self) -> Result<WorkerExit, SupervisorError>;

    async fn kill(&mut self) -> Result<(), SupervisorError>;
}

/// Starts workers.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>, SupervisorError>;
}
