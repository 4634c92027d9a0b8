//! Campaign operations exposed to callers: create, read, retry, delete.

use std::collections::HashMap;
use std::sync::Arc;

use campaign_core::{CampaignError, CampaignResult};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatcher::{SyncJob, TaskDispatcher};
use crate::lease::LeaseTable;
use crate::reconciliation::ReconciliationSweep;
use crate::record::{CampaignRecord, CampaignStatus, NewCampaign};
use crate::repository::{CampaignFilter, CampaignRepository};

/// Record counts for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignStats {
    pub total: usize,
    /// Every status is present, zero when empty.
    pub by_status: HashMap<CampaignStatus, usize>,
}

pub struct CampaignService {
    repository: Arc<dyn CampaignRepository>,
    dispatcher: Arc<TaskDispatcher>,
    sweep: Arc<ReconciliationSweep>,
    leases: Arc<LeaseTable>,
    lazy_sync: bool,
}

impl CampaignService {
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        dispatcher: Arc<TaskDispatcher>,
        sweep: Arc<ReconciliationSweep>,
        leases: Arc<LeaseTable>,
        lazy_sync: bool,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            sweep,
            leases,
            lazy_sync,
        }
    }

    /// Stores a new `Pending` campaign and schedules its synchronization.
    pub async fn create_campaign(&self, campaign: NewCampaign) -> CampaignResult<CampaignRecord> {
        let record = CampaignRecord::new(campaign.validate()?);
        self.repository.insert(record.clone()).await?;
        metrics::counter!("campaign.created").increment(1);
        info!(campaign_id = %record.id, name = %record.name, budget = %record.budget, "campaign created");

        if let Err(e) = self.dispatcher.enqueue(SyncJob::Synchronize(record.id)).await {
            warn!(campaign_id = %record.id, error = %e, "campaign stored but sync not scheduled");
            return Err(e);
        }
        Ok(record)
    }

    pub async fn get_campaign(&self, id: Uuid) -> CampaignResult<CampaignRecord> {
        self.repository.get(id).await
    }

    /// Matching campaigns, newest first. Reconciles pending confirmations
    /// first when lazy sync is on.
    pub async fn list_campaigns(&self, filter: &CampaignFilter) -> CampaignResult<Vec<CampaignRecord>> {
        if self.lazy_sync {
            self.sweep.sweep_once().await;
        }
        self.repository.find(filter).await
    }

    /// Puts a failed campaign back in the queue.
    pub async fn retry_campaign(&self, id: Uuid) -> CampaignResult<CampaignRecord> {
        let record = {
            let _lease = self.leases.acquire(id).await;
            let mut record = self.repository.get(id).await?;
            record.reset_for_retry()?;
            self.repository.save(&record, CampaignStatus::Failed).await?;
            record
        };

        self.dispatcher.enqueue(SyncJob::Synchronize(id)).await?;
        metrics::counter!("campaign.retried").increment(1);
        info!(campaign_id = %id, retry_count = record.retry_count, "campaign queued for retry");
        Ok(record)
    }

    /// Removes a campaign that never reached the platform.
    pub async fn delete_campaign(&self, id: Uuid) -> CampaignResult<CampaignRecord> {
        let _lease = self.leases.acquire(id).await;
        let record = self.repository.get(id).await?;
        if record.has_external_id() {
            return Err(CampaignError::CannotDeleteSynced(id));
        }
        let removed = self.repository.delete(id).await?;
        info!(campaign_id = %id, "campaign deleted");
        Ok(removed)
    }

    pub async fn stats(&self) -> CampaignResult<CampaignStats> {
        let counts = self.repository.count_by_status().await?;
        let by_status: HashMap<_, _> = CampaignStatus::ALL
            .iter()
            .map(|status| (*status, counts.get(status).copied().unwrap_or(0)))
            .collect();
        Ok(CampaignStats {
            total: by_status.values().sum(),
            by_status,
        })
    }
}
