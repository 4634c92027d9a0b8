//! Fixed-interval trigger for the reconciliation sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::dispatcher::{SyncJob, TaskDispatcher};

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct SweepScheduler {
    dispatcher: Arc<TaskDispatcher>,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(dispatcher: Arc<TaskDispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
        }
    }

    /// Enqueues a sweep on every tick, starting immediately, until `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Sweep scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.dispatcher.enqueue(SyncJob::Sweep).await {
                            warn!(error = %e, "could not enqueue sweep, stopping scheduler");
                            break;
                        }
                        metrics::counter!("campaign.sweep.scheduled").increment(1);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Sweep scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::JobRunner;
    use crate::lease::LeaseTable;
    use crate::orchestrator::SyncOrchestrator;
    use crate::reconciliation::ReconciliationSweep;
    use crate::record::{CampaignRecord, CampaignStatus, NewCampaign};
    use crate::repository::{CampaignRepository, InMemoryCampaignRepository};
    use crate::retry::RetryPolicy;
    use crate::test_support::ScriptedAdService;
    use campaign_core::config::DispatcherConfig;
    use rust_decimal_macros::dec;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_sweeps_until_shutdown() {
        let repo = Arc::new(InMemoryCampaignRepository::new());
        let ads = Arc::new(ScriptedAdService::new());
        let leases = Arc::new(LeaseTable::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            repo.clone(),
            ads.clone(),
            RetryPolicy::default(),
            leases.clone(),
        ));
        let sweep = Arc::new(ReconciliationSweep::new(
            repo.clone(),
            ads.clone(),
            RetryPolicy::default(),
            leases,
            500,
        ));
        let dispatcher = Arc::new(TaskDispatcher::start(
            &DispatcherConfig::default(),
            JobRunner::new(orchestrator, sweep),
        ));

        let mut campaign = CampaignRecord::new(
            NewCampaign::new("Scheduled", dec!(5.00), vec!["socks".to_string()])
                .validate()
                .unwrap(),
        );
        repo.insert(campaign.clone()).await.unwrap();
        campaign.mark_processing("AMZ-60006").unwrap();
        repo.save(&campaign, CampaignStatus::Pending).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = SweepScheduler::new(dispatcher.clone(), Duration::from_secs(60)).spawn(rx);

        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        dispatcher.shutdown().await;

        // Ticks at 0s, 60s and 120s; only the first finds work.
        assert_eq!(ads.polls(), 1);
        assert_eq!(
            repo.get(campaign.id).await.unwrap().status,
            CampaignStatus::Active
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_when_dispatcher_closes() {
        let repo = Arc::new(InMemoryCampaignRepository::new());
        let ads = Arc::new(ScriptedAdService::new());
        let leases = Arc::new(LeaseTable::new());
        let runner = JobRunner::new(
            Arc::new(SyncOrchestrator::new(
                repo.clone(),
                ads.clone(),
                RetryPolicy::default(),
                leases.clone(),
            )),
            Arc::new(ReconciliationSweep::new(
                repo,
                ads,
                RetryPolicy::default(),
                leases,
                500,
            )),
        );
        let dispatcher = Arc::new(TaskDispatcher::start(&DispatcherConfig::default(), runner));
        dispatcher.shutdown().await;

        let (_tx, rx) = watch::channel(false);
        let handle = SweepScheduler::new(dispatcher, Duration::from_secs(1)).spawn(rx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_does_not_kill_scheduler() {
        let repo = Arc::new(InMemoryCampaignRepository::new());
        let ads = Arc::new(ScriptedAdService::new());
        let leases = Arc::new(LeaseTable::new());
        let runner = JobRunner::new(
            Arc::new(SyncOrchestrator::new(
                repo.clone(),
                ads.clone(),
                RetryPolicy::default(),
                leases.clone(),
            )),
            Arc::new(ReconciliationSweep::new(
                repo,
                ads,
                RetryPolicy::default(),
                leases,
                500,
            )),
        );
        let dispatcher = Arc::new(TaskDispatcher::start(&DispatcherConfig::default(), runner));

        let (tx, rx) = watch::channel(false);
        let handle = SweepScheduler::new(dispatcher.clone(), Duration::ZERO).spawn(rx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        assert!(handle.await.is_ok());
        dispatcher.shutdown().await;
    }
}
