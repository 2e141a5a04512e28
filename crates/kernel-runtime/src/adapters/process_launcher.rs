//! Worker processes as child processes of the coordinator.

use crate::supervisor::{
    SupervisorError, WorkerExit, WorkerLauncher, WorkerProcess, WORKER_SLOT_ENV,
};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::{Child, Command};

/// Launches workers by re-executing a program with the worker slot set in
/// its environment. Children are killed when their handle is dropped.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running binary with its own arguments.
    pub fn current() -> Result<Self, SupervisorError> {
        let program =
            std::env::current_exe().map_err(|e| SupervisorError::Executable(e.to_string()))?;
        Ok(Self::new(program, std::env::args_os().skip(1).collect()))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_SLOT_ENV, slot.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Launch {
                slot,
                reason: e.to_string(),
            })?;
        Ok(Box::new(ChildWorker { slot, child }))
    }
}

struct ChildWorker {
    slot: usize,
    child: Child,
}

fn exit_of(status: ExitStatus) -> WorkerExit {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    WorkerExit {
        code: status.code(),
        signal,
        ..WorkerExit::default()
    }
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<WorkerExit, SupervisorError> {
        self.child
            .wait()
            .await
            .map(exit_of)
            .map_err(|e| SupervisorError::Wait {
                slot: self.slot,
                reason: e.to_string(),
            })
    }

    async fn kill(&mut self) -> Result<(), SupervisorError> {
        self.child.kill().await.map_err(|e| SupervisorError::Kill {
            slot: self.slot,
            reason: e.to_string(),
        })
    }
}
