//! The supervision loop.

use super::launcher::{WorkerExit, WorkerLauncher, WorkerProcess};
use super::policy::{RestartDecision, RestartStrategy, RestartTracker};
use super::SupervisorError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// Counters shared between the loop and its handle.
#[derive(Debug, Default)]
pub struct SupervisorStats {
    launches: AtomicUsize,
    restarts: AtomicUsize,
}

impl SupervisorStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

type WorkerOutcome = (usize, Option<WorkerExit>);

/// Keeps `workers` worker processes alive.
pub struct Supervisor {
    launcher: Arc<dyn WorkerLauncher>,
    workers: usize,
    restart: RestartStrategy,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, workers: usize, restart: RestartStrategy) -> Self {
        Self {
            launcher,
            workers,
            restart,
        }
    }

    /// Launch the workers and supervise them on a background task.
    pub fn spawn(self) -> SupervisorHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(SupervisorStats::default());
        let workers = self.workers;
        let task = tokio::spawn(self.run(shutdown_rx, Arc::clone(&stats)));
        SupervisorHandle {
            shutdown,
            task: Some(task),
            stats,
            workers,
        }
    }

    async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        stats: Arc<SupervisorStats>,
    ) -> Result<(), SupervisorError> {
        let (stop, stop_rx) = watch::channel(false);
        let mut running: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut tracker = RestartTracker::new(self.restart.clone());
        info!(workers = self.workers, strategy = ?self.restart, "Supervisor starting workers");

        let mut result = Ok(());
        for slot in 0..self.workers {
            if let Err(e) = self.launch(slot, &mut running, &stop_rx, &stats).await {
                result = Err(e);
                break;
            }
        }

        if result.is_ok() {
            result = loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Supervisor stopping workers");
                            break Ok(());
                        }
                    }
                    joined = running.join_next() => {
                        let Some(joined) = joined else {
                            break Ok(());
                        };
                        let (slot, exit) = match joined {
                            Ok(outcome) => outcome,
                            Err(e) => break Err(SupervisorError::Join(e.to_string())),
                        };
                        let Some(exit) = exit else {
                            continue;
                        };
                        warn!(slot, status = %exit, uptime_ms = exit.uptime.as_millis() as u64, "Worker exited");

                        match tracker.on_exit(slot, exit.uptime, Instant::now()) {
                            RestartDecision::Restart { delay } => {
                                if !delay.is_zero() {
                                    info!(slot, delay_ms = delay.as_millis() as u64, "Delaying worker restart");
                                    tokio::select! {
                                        _ = tokio::time::sleep(delay) => {}
                                        _ = shutdown.changed() => break Ok(()),
                                    }
                                }
                                if let Err(e) = self.launch(slot, &mut running, &stop_rx, &stats).await {
                                    break Err(e);
                                }
                                stats.restarts.fetch_add(1, Ordering::SeqCst);
                            }
                            RestartDecision::GiveUp { restarts, window } => {
                                break Err(SupervisorError::CrashLoop { restarts, window });
                            }
                        }
                    }
                }
            };
        }

        if let Err(e) = &result {
            error!(error = %e, "Supervisor failed, stopping all workers");
        }
        let _ = stop.send(true);
        while running.join_next().await.is_some() {}
        info!(launches = stats.launches(), restarts = stats.restarts(), "Supervisor stopped");
        result
    }

    async fn launch(
        &self,
        slot: usize,
        running: &mut JoinSet<WorkerOutcome>,
        stop: &watch::Receiver<bool>,
        stats: &SupervisorStats,
    ) -> Result<(), SupervisorError> {
        let process = self.launcher.launch(slot).await?;
        stats.launches.fetch_add(1, Ordering::SeqCst);
        info!(slot, pid = ?process.id(), "Worker launched");
        running.spawn(watch_worker(slot, process, stop.clone()));
        Ok(())
    }
}

async fn watch_worker(
    slot: usize,
    mut process: Box<dyn WorkerProcess>,
    mut stop: watch::Receiver<bool>,
) -> WorkerOutcome {
    let started = Instant::now();
    let exited = tokio::select! {
        exit = process.wait() => Some(exit),
        _ = stop.changed() => None,
    };

    match exited {
        Some(Ok(exit)) => (slot, Some(exit.with_uptime(started.elapsed()))),
        Some(Err(e)) => {
            warn!(slot, error = %e, "Lost track of worker");
            (slot, Some(WorkerExit::default().with_uptime(started.elapsed())))
        }
        None => {
            if let Err(e) = process.kill().await {
                warn!(slot, error = %e, "Failed to stop worker");
            }
            (slot, None)
        }
    }
}

/// Control over a running [`Supervisor`].
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), SupervisorError>>>,
    stats: Arc<SupervisorStats>,
    workers: usize,
}

impl SupervisorHandle {
    /// Target number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn launches(&self) -> usize {
        self.stats.launches()
    }

    pub fn restarts(&self) -> usize {
        self.stats.restarts()
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the supervision loop to end. Returns `Ok` at once if it
    /// already ended and was joined before.
    pub async fn join(&mut self) -> Result<(), SupervisorError> {
        match self.task.as_mut() {
            Some(task) => {
                let result = task.await;
                self.task = None;
                result.map_err(|e| SupervisorError::Join(e.to_string()))?
            }
            None => Ok(()),
        }
    }

    /// Stop every worker and wait for the loop to end.
    pub async fn shutdown(mut self) -> Result<(), SupervisorError> {
        let _ = self.shutdown.send(true);
        self.join().await
    }
}
