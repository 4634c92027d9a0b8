//! Wires the engine components together and owns their background tasks.

use std::sync::Arc;
use std::time::Duration;

use campaign_core::AppConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::dispatcher::{JobRunner, TaskDispatcher};
use crate::external::AdService;
use crate::lease::LeaseTable;
use crate::orchestrator::SyncOrchestrator;
use crate::reconciliation::ReconciliationSweep;
use crate::repository::CampaignRepository;
use crate::retry::RetryPolicy;
use crate::scheduler::SweepScheduler;
use crate::service::CampaignService;

/// A running engine: worker pool, optional sweep scheduler and the service
/// facade over them.
pub struct SyncEngine {
    service: Arc<CampaignService>,
    orchestrator: Arc<SyncOrchestrator>,
    sweep: Arc<ReconciliationSweep>,
    dispatcher: Arc<TaskDispatcher>,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Starts the workers and, when enabled, the sweep scheduler. Must be
    /// called inside a tokio runtime.
    pub fn start(
        config: &AppConfig,
        repository: Arc<dyn CampaignRepository>,
        ads: Arc<dyn AdService>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let leases = Arc::new(LeaseTable::new());

        let orchestrator = Arc::new(SyncOrchestrator::new(
            repository.clone(),
            ads.clone(),
            retry.clone(),
            leases.clone(),
        ));
        let sweep = Arc::new(ReconciliationSweep::new(
            repository.clone(),
            ads,
            retry,
            leases.clone(),
            config.sweep.batch_size,
        ));
        let dispatcher = Arc::new(TaskDispatcher::start(
            &config.dispatcher,
            JobRunner::new(orchestrator.clone(), sweep.clone()),
        ));
        let service = Arc::new(CampaignService::new(
            repository,
            dispatcher.clone(),
            sweep.clone(),
            leases,
            config.sweep.lazy_sync,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = config.sweep.enabled.then(|| {
            SweepScheduler::new(
                dispatcher.clone(),
                Duration::from_secs(config.sweep.interval_secs),
            )
            .spawn(shutdown_rx)
        });

        info!(
            node_id = %config.node_id,
            workers = config.dispatcher.workers,
            sweep_enabled = config.sweep.enabled,
            lazy_sync = config.sweep.lazy_sync,
            "Sync engine started"
        );

        Self {
            service,
            orchestrator,
            sweep,
            dispatcher,
            shutdown_tx,
            scheduler,
        }
    }

    pub fn service(&self) -> Arc<CampaignService> {
        self.service.clone()
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn sweep(&self) -> Arc<ReconciliationSweep> {
        self.sweep.clone()
    }

    pub fn dispatcher(&self) -> Arc<TaskDispatcher> {
        self.dispatcher.clone()
    }

    /// Stops the scheduler, then drains the queue and joins the workers.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.scheduler.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Sweep scheduler task panicked");
            }
        }
        self.dispatcher.shutdown().await;
        info!("Sync engine stopped");
    }
}
