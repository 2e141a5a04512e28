//! Coordinator and worker roles.

use super::launcher::{worker_slot_from_env, WorkerLauncher};
use super::policy::RestartStrategy;
use super::run::{Supervisor, SupervisorHandle};
use super::worker_count;
use crate::adapters::ProcessLauncher;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{Kernel, KernelBuilder, StartMode};
use std::sync::Arc;
use tracing::{info, warn};

/// How to run a cluster.
#[derive(Clone, Default)]
pub struct ClusterOptions {
    pub restart: RestartStrategy,
    /// CPU count to size the cluster by; detected when `None`.
    pub available_cpus: Option<usize>,
    /// Launches workers; re-executes the current binary when `None`.
    pub launcher: Option<Arc<dyn WorkerLauncher>>,
    /// Set in worker processes.
    pub worker_slot: Option<usize>,
}

impl ClusterOptions {
    /// Options for this process, reading the worker slot from the
    /// environment.
    pub fn from_env() -> Self {
        Self {
            worker_slot: worker_slot_from_env(),
            ..Self::default()
        }
    }

    pub fn with_restart(mut self, restart: RestartStrategy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_available_cpus(mut self, cpus: usize) -> Self {
        self.available_cpus = Some(cpus);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn as_worker(mut self, slot: usize) -> Self {
        self.worker_slot = Some(slot);
        self
    }
}

impl std::fmt::Debug for ClusterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterOptions")
            .field("restart", &self.restart)
            .field("available_cpus", &self.available_cpus)
            .field("custom_launcher", &self.launcher.is_some())
            .field("worker_slot", &self.worker_slot)
            .finish()
    }
}

/// The role this process took in the cluster.
#[derive(Debug)]
pub enum ClusterRole {
    Coordinator(Coordinator),
    Worker(Kernel),
}

/// The supervising process: a headless kernel plus its workers.
pub struct Coordinator {
    kernel: Kernel,
    supervisor: SupervisorHandle,
}

impl Coordinator {
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Stop the workers, then the kernel.
    pub async fn shutdown(self) -> KernelResult<()> {
        let Self {
            mut kernel,
            supervisor,
        } = self;
        let workers = supervisor.shutdown().await;
        let kernel = kernel.shutdown().await;
        workers?;
        kernel
    }

    /// Run until Ctrl-C or until the supervisor gives up.
    pub async fn run_until_signal(mut self) -> KernelResult<()> {
        info!(workers = self.supervisor.workers(), "Coordinator running. Press Ctrl+C to stop.");
        let outcome = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for the interrupt signal");
                }
                None
            }
            ended = self.supervisor.join() => Some(ended),
        };

        match outcome {
            None => self.shutdown().await,
            Some(ended) => {
                let kernel = self.kernel.shutdown().await;
                ended?;
                kernel
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("kernel", &self.kernel)
            .field("workers", &self.supervisor.workers())
            .finish()
    }
}

pub(crate) async fn start_cluster(
    builder: KernelBuilder,
    mode: StartMode,
    options: ClusterOptions,
) -> KernelResult<ClusterRole> {
    if let Some(slot) = options.worker_slot {
        info!(slot, "Starting as cluster worker");
        return builder.start(mode).await.map(ClusterRole::Worker);
    }

    let cpus = options.available_cpus.unwrap_or_else(num_cpus::get);
    let workers = worker_count(cpus, builder.config().limit_workers());
    info!(workers, cpus, "Starting as cluster coordinator");

    let mut kernel = builder.start(StartMode::Headless).await?;
    let launcher: Arc<dyn WorkerLauncher> = match options.launcher {
        Some(launcher) => launcher,
        None => match ProcessLauncher::current() {
            Ok(launcher) => Arc::new(launcher),
            Err(e) => {
                if let Err(shutdown) = kernel.shutdown().await {
                    warn!(error = %shutdown, "Failed to shut down coordinator kernel");
                }
                return Err(KernelError::Supervisor(e));
            }
        },
    };

    let supervisor = Supervisor::new(launcher, workers, options.restart).spawn();
    Ok(ClusterRole::Coordinator(Coordinator { kernel, supervisor }))
}
