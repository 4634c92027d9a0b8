//! Drives one campaign from creation to provisioned (or failed) on the ad
//! platform.

use std::sync::Arc;

use campaign_core::{CampaignError, CampaignResult};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::external::{AdService, CampaignSpec};
use crate::lease::LeaseTable;
use crate::record::{CampaignRecord, CampaignStatus, MAX_RETRIES};
use crate::repository::CampaignRepository;
use crate::retry::RetryPolicy;

/// What a `synchronize` pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Created remotely; the record is now `Processing`.
    Provisioned { external_id: String },
    /// A retried record that already had a remote campaign went back to `Processing`.
    Resumed { external_id: String },
    /// The platform refused or kept failing; the record is now `Failed`.
    Failed { reason: String },
    /// Already live. Nothing was called or written.
    AlreadySynced,
    /// Already provisioned and awaiting confirmation. Nothing was called or written.
    AlreadyProvisioned,
    /// `Failed` and waiting for an operator retry. Nothing was called or written.
    NotPending,
    /// Another pass changed the record first; this pass's write was dropped.
    Superseded,
}

pub struct SyncOrchestrator {
    repository: Arc<dyn CampaignRepository>,
    ads: Arc<dyn AdService>,
    retry: RetryPolicy,
    leases: Arc<LeaseTable>,
}

impl SyncOrchestrator {
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        ads: Arc<dyn AdService>,
        retry: RetryPolicy,
        leases: Arc<LeaseTable>,
    ) -> Self {
        Self {
            repository,
            ads,
            retry,
            leases,
        }
    }

    /// Pushes a campaign to the ad platform. Safe to call any number of times
    /// for the same id.
    ///
    /// Returns `NotFound` when the record vanished and `MaxRetriesExceeded`
    /// when the record may not fail again. Platform errors never surface here;
    /// they are persisted on the record.
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn synchronize(&self, campaign_id: Uuid) -> CampaignResult<SyncOutcome> {
        let _lease = self.leases.acquire(campaign_id).await;
        metrics::counter!("campaign.sync.started").increment(1);

        match self.run(campaign_id).await {
            Err(e) if e.is_unexpected() => {
                error!(error = %e, "unexpected failure during synchronization");
                metrics::counter!("campaign.sync.unexpected_errors").increment(1);
                self.persist_unexpected(campaign_id, &e.to_string()).await
            }
            Err(CampaignError::Conflict { .. }) => {
                info!("record changed by a concurrent pass, dropping write");
                Ok(SyncOutcome::Superseded)
            }
            other => other,
        }
    }

    async fn run(&self, campaign_id: Uuid) -> CampaignResult<SyncOutcome> {
        let mut campaign = self.repository.get(campaign_id).await?;

        match campaign.status {
            CampaignStatus::Active => {
                debug!("campaign already synced");
                return Ok(SyncOutcome::AlreadySynced);
            }
            CampaignStatus::Processing => {
                debug!("campaign already provisioned, awaiting confirmation");
                return Ok(SyncOutcome::AlreadyProvisioned);
            }
            CampaignStatus::Failed if campaign.retries_exhausted() => {
                return Err(max_retries(campaign_id));
            }
            CampaignStatus::Failed => {
                debug!("campaign failed, waiting for a retry request");
                return Ok(SyncOutcome::NotPending);
            }
            _ => {}
        }

        // A retried record that was provisioned before its poll failed keeps
        // its remote campaign; creating a second one would orphan the first.
        if let Some(external_id) = campaign.external_id.clone() {
            campaign.mark_processing(external_id.clone())?;
            self.repository
                .save(&campaign, CampaignStatus::Pending)
                .await?;
            info!(external_id = %external_id, "resumed confirmation of provisioned campaign");
            return Ok(SyncOutcome::Resumed { external_id });
        }

        let spec = CampaignSpec::from(&campaign);
        let result = self
            .retry
            .execute("create_campaign", || self.ads.create_campaign(&spec))
            .await;

        match result {
            Ok(created) => {
                campaign.mark_processing(created.external_id.clone())?;
                self.repository
                    .save(&campaign, CampaignStatus::Pending)
                    .await?;
                info!(external_id = %created.external_id, "campaign provisioned");
                metrics::counter!("campaign.sync.provisioned").increment(1);
                Ok(SyncOutcome::Provisioned {
                    external_id: created.external_id,
                })
            }
            Err(ad_error) => {
                if campaign.retries_exhausted() {
                    warn!(error = %ad_error, retry_count = campaign.retry_count, "failure past retry cap");
                    return Err(max_retries(campaign_id));
                }
                let reason = ad_error.to_string();
                campaign.mark_failed(reason.clone())?;
                self.repository
                    .save(&campaign, CampaignStatus::Pending)
                    .await?;
                warn!(
                    error = %ad_error,
                    retryable = ad_error.retryable(),
                    retry_count = campaign.retry_count,
                    "campaign sync failed"
                );
                metrics::counter!("campaign.sync.failed").increment(1);
                Ok(SyncOutcome::Failed { reason })
            }
        }
    }

    /// Marks a still `Pending` record failed after a fault unrelated to the
    /// platform, such as a storage error or a panicking worker. Used by the
    /// dispatcher as well.
    pub async fn fail_unexpected(
        &self,
        campaign_id: Uuid,
        detail: &str,
    ) -> CampaignResult<SyncOutcome> {
        let _lease = self.leases.acquire(campaign_id).await;
        self.persist_unexpected(campaign_id, detail).await
    }

    async fn persist_unexpected(
        &self,
        campaign_id: Uuid,
        detail: &str,
    ) -> CampaignResult<SyncOutcome> {
        let mut campaign: CampaignRecord = self.repository.get(campaign_id).await?;
        if campaign.status != CampaignStatus::Pending {
            // Provisioned, live or already failed: the pass got far enough
            // that there is nothing transient to clean up.
            return Ok(SyncOutcome::Superseded);
        }
        if campaign.retries_exhausted() {
            return Err(max_retries(campaign_id));
        }

        let reason = format!("Unexpected error: {detail}");
        campaign.mark_failed(reason.clone())?;
        match self.repository.save(&campaign, CampaignStatus::Pending).await {
            Ok(()) => Ok(SyncOutcome::Failed { reason }),
            Err(CampaignError::Conflict { .. }) => Ok(SyncOutcome::Superseded),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "could not record unexpected failure");
                Err(e)
            }
        }
    }
}

fn max_retries(id: Uuid) -> CampaignError {
    CampaignError::MaxRetriesExceeded {
        id,
        max_retries: MAX_RETRIES,
    }
}
