//! Periodic reconciliation of provisioned campaigns against the platform.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::external::{AdService, RemoteStatus};
use crate::lease::LeaseTable;
use crate::record::{CampaignRecord, CampaignStatus};
use crate::repository::{CampaignFilter, CampaignRepository};
use crate::retry::RetryPolicy;

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Campaigns picked up by the scan.
    pub total: usize,
    /// Polled without error, whatever the reported status.
    pub succeeded: usize,
    pub failed: usize,
    /// Subset of `succeeded` that went live on this sweep.
    pub activated: usize,
    /// Changed by another pass between the scan and the poll.
    pub skipped: usize,
}

enum Reconciled {
    Activated,
    StillProcessing,
    Failed,
    Skipped,
}

pub struct ReconciliationSweep {
    repository: Arc<dyn CampaignRepository>,
    ads: Arc<dyn AdService>,
    retry: RetryPolicy,
    leases: Arc<LeaseTable>,
    batch_size: usize,
    /// Last campaign scanned; the next batch starts after it.
    cursor: Mutex<Option<(DateTime<Utc>, Uuid)>>,
}

impl ReconciliationSweep {
    pub fn new(
        repository: Arc<dyn CampaignRepository>,
        ads: Arc<dyn AdService>,
        retry: RetryPolicy,
        leases: Arc<LeaseTable>,
        batch_size: usize,
    ) -> Self {
        Self {
            repository,
            ads,
            retry,
            leases,
            batch_size,
            cursor: Mutex::new(None),
        }
    }

    /// Polls the next batch of campaigns awaiting confirmation. Batches rotate
    /// through the whole backlog oldest first, so every campaign is polled
    /// within `ceil(backlog / batch_size)` sweeps. A failure on one campaign
    /// never stops the others.
    pub async fn sweep_once(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let candidates = match self.next_batch().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "sweep scan failed");
                metrics::counter!("campaign.sweep.scan_errors").increment(1);
                return report;
            }
        };
        report.total = candidates.len();

        for candidate in candidates {
            match self.reconcile(candidate).await {
                Ok(Reconciled::Activated) => {
                    report.succeeded += 1;
                    report.activated += 1;
                }
                Ok(Reconciled::StillProcessing) => report.succeeded += 1,
                Ok(Reconciled::Failed) => report.failed += 1,
                Ok(Reconciled::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(error = %e, "campaign reconciliation failed");
                    report.failed += 1;
                }
            }
        }

        self.leases.prune();
        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("campaign.sweep.duration_seconds").record(elapsed);
        metrics::counter!("campaign.sweep.runs").increment(1);
        metrics::counter!("campaign.sweep.activated").increment(report.activated as u64);
        metrics::counter!("campaign.sweep.failed").increment(report.failed as u64);

        if report.total > 0 {
            info!(
                total = report.total,
                succeeded = report.succeeded,
                failed = report.failed,
                activated = report.activated,
                skipped = report.skipped,
                elapsed_ms = (elapsed * 1000.0) as u64,
                "reconciliation sweep complete"
            );
        } else {
            debug!("reconciliation sweep found nothing to poll");
        }
        report
    }

    async fn next_batch(&self) -> CampaignResult<Vec<CampaignRecord>> {
        let cursor = *self.cursor.lock();
        let mut batch = self
            .repository
            .find(&CampaignFilter::awaiting_confirmation(self.batch_size, cursor))
            .await?;

        // Reached the end of the backlog: wrap around to the oldest.
        if cursor.is_some() && batch.len() < self.batch_size {
            let seen: HashSet<Uuid> = batch.iter().map(|c| c.id).collect();
            let wrapped = self
                .repository
                .find(&CampaignFilter::awaiting_confirmation(
                    self.batch_size - batch.len(),
                    None,
                ))
                .await?;
            batch.extend(wrapped.into_iter().filter(|c| !seen.contains(&c.id)));
        }

        *self.cursor.lock() = batch.last().map(|c| (c.created_at, c.id));
        Ok(batch)
    }

    #[tracing::instrument(skip_all, fields(campaign_id = %candidate.id))]
    async fn reconcile(&self, candidate: CampaignRecord) -> CampaignResult<Reconciled> {
        let _lease = self.leases.acquire(candidate.id).await;

        let mut campaign = match self.repository.get(candidate.id).await {
            Ok(campaign) => campaign,
            Err(CampaignError::NotFound(_)) => return Ok(Reconciled::Skipped),
            Err(e) => return Err(e),
        };
        let external_id = match (&campaign.status, campaign.external_id.clone()) {
            (CampaignStatus::Processing, Some(external_id)) => external_id,
            _ => return Ok(Reconciled::Skipped),
        };

        let polled = self
            .retry
            .execute("campaign_status", || self.ads.campaign_status(&external_id))
            .await;

        let reason = match polled {
            Ok(report) => match report.status {
                RemoteStatus::Active => {
                    campaign.mark_active(Utc::now())?;
                    if !self.save(&campaign).await? {
                        return Ok(Reconciled::Skipped);
                    }
                    info!(external_id = %external_id, "campaign is live");
                    metrics::counter!("campaign.sync.activated").increment(1);
                    return Ok(Reconciled::Activated);
                }
                RemoteStatus::Processing => {
                    debug!(external_id = %external_id, serving_status = ?report.serving_status, "still processing");
                    return Ok(Reconciled::StillProcessing);
                }
                RemoteStatus::Rejected => {
                    format!("Campaign {external_id} was rejected by the ad platform")
                }
            },
            Err(e) => e.to_string(),
        };

        if campaign.retries_exhausted() {
            warn!(reason = %reason, retry_count = campaign.retry_count, "poll failure past retry cap, leaving record");
            return Ok(Reconciled::Failed);
        }
        campaign.mark_failed(reason.clone())?;
        if !self.save(&campaign).await? {
            return Ok(Reconciled::Skipped);
        }
        warn!(reason = %reason, retry_count = campaign.retry_count, "campaign failed during reconciliation");
        Ok(Reconciled::Failed)
    }

    /// Conditional save from `Processing`. `false` when another pass won.
    async fn save(&self, campaign: &CampaignRecord) -> CampaignResult<bool> {
        match self
            .repository
            .save(campaign, CampaignStatus::Processing)
            .await
        {
            Ok(()) => Ok(true),
            Err(CampaignError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
