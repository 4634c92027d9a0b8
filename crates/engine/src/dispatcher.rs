//! Bounded job queue consumed by a fixed pool of workers.

use std::fmt;
use std::sync::Arc;

use campaign_core::config::DispatcherConfig;
use campaign_core::{CampaignError, CampaignResult};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::orchestrator::SyncOrchestrator;
use crate::reconciliation::ReconciliationSweep;

/// A unit of background work. Delivery is at-least-once; both jobs are
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncJob {
    Synchronize(Uuid),
    Sweep,
}

impl fmt::Display for SyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncJob::Synchronize(id) => write!(f, "synchronize:{id}"),
            SyncJob::Sweep => f.write_str("sweep"),
        }
    }
}

/// Executes jobs on behalf of the workers.
#[derive(Clone)]
pub struct JobRunner {
    orchestrator: Arc<SyncOrchestrator>,
    sweep: Arc<ReconciliationSweep>,
}

impl JobRunner {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, sweep: Arc<ReconciliationSweep>) -> Self {
        Self {
            orchestrator,
            sweep,
        }
    }

    /// Runs one job in its own task so a panic surfaces as a `JoinError`
    /// instead of taking the worker down. Never fails.
    async fn run(&self, job: SyncJob) {
        let runner = self.clone();
        let joined = tokio::spawn(async move { runner.execute(job).await }).await;

        if let Err(e) = joined {
            metrics::counter!("dispatcher.jobs.panicked").increment(1);
            error!(job = %job, error = %e, "job task panicked");
            if let SyncJob::Synchronize(id) = job {
                let detail = format!("sync task panicked: {e}");
                if let Err(e) = self.orchestrator.fail_unexpected(id, &detail).await {
                    warn!(campaign_id = %id, error = %e, "could not mark campaign failed after panic");
                }
            }
        }
    }

    async fn execute(&self, job: SyncJob) {
        match job {
            SyncJob::Synchronize(id) => match self.orchestrator.synchronize(id).await {
                Ok(outcome) => {
                    debug!(campaign_id = %id, outcome = ?outcome, "sync job finished");
                }
                Err(CampaignError::NotFound(_)) => {
                    warn!(campaign_id = %id, "campaign not found, dropping sync job");
                }
                Err(CampaignError::MaxRetriesExceeded { max_retries, .. }) => {
                    warn!(campaign_id = %id, max_retries, "campaign exceeded max retries, dropping sync job");
                }
                Err(e) => {
                    error!(campaign_id = %id, error = %e, "sync job failed");
                }
            },
            SyncJob::Sweep => {
                self.sweep.sweep_once().await;
            }
        }
        metrics::counter!("dispatcher.jobs.completed").increment(1);
    }
}

/// Owns the queue and the worker tasks.
pub struct TaskDispatcher {
    sender: parking_lot::Mutex<Option<mpsc::Sender<SyncJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl TaskDispatcher {
    /// Spawns `config.workers` workers sharing one bounded queue.
    pub fn start(config: &DispatcherConfig, runner: JobRunner) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<SyncJob>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = config.workers.max(1);
        let handles = (0..workers)
            .map(|i| {
                let receiver = receiver.clone();
                let runner = runner.clone();
                tokio::spawn(async move { worker_loop(i, receiver, runner).await })
            })
            .collect();

        info!(workers, capacity, "Task dispatcher started");

        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            capacity,
        }
    }

    /// Queues a job, waiting for room when the queue is full.
    pub async fn enqueue(&self, job: SyncJob) -> CampaignResult<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(CampaignError::DispatcherClosed)?;
        sender
            .send(job)
            .await
            .map_err(|_| CampaignError::DispatcherClosed)?;

        metrics::counter!("dispatcher.jobs.enqueued").increment(1);
        metrics::gauge!("dispatcher.queue_depth")
            .set((self.capacity - sender.capacity()) as f64);
        debug!(job = %job, "job enqueued");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map(|s| self.capacity - s.capacity())
            .unwrap_or(0)
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        info!(workers = handles.len(), "Draining task dispatcher");
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Task dispatcher stopped");
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<SyncJob>>>,
    runner: JobRunner,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "queue closed, worker exiting");
            break;
        };
        runner.run(job).await;
    }
}
