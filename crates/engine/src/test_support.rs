//! Scripted ad service for deterministic tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use campaign_core::AdServiceError;
use chrono::Utc;
use parking_lot::Mutex;

use crate::external::{
    AdService, CampaignSpec, CampaignStatusReport, CreatedCampaign, RemoteStatus, ServingStatus,
};

/// Replays queued responses in order and counts every call. An empty queue
/// answers with a success.
#[derive(Default)]
pub struct ScriptedAdService {
    creates: Mutex<VecDeque<Result<String, AdServiceError>>>,
    polls: Mutex<VecDeque<Result<RemoteStatus, AdServiceError>>>,
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    polled_ids: Mutex<Vec<String>>,
}

impl ScriptedAdService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create(&self, response: Result<&str, AdServiceError>) -> &Self {
        self.creates
            .lock()
            .push_back(response.map(str::to_string));
        self
    }

    pub fn push_poll(&self, response: Result<RemoteStatus, AdServiceError>) -> &Self {
        self.polls.lock().push_back(response);
        self
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.polled_ids.lock().clone()
    }
}

pub fn rate_limited() -> AdServiceError {
    AdServiceError::RateLimited("Rate limit exceeded. Retry after 60 seconds.".to_string())
}

#[async_trait]
impl AdService for ScriptedAdService {
    async fn create_campaign(&self, _spec: &CampaignSpec) -> Result<CreatedCampaign, AdServiceError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.creates.lock().pop_front();
        let external_id = match next {
            Some(response) => response?,
            None => format!("AMZ-{}", 10_000 + n),
        };
        Ok(CreatedCampaign {
            external_id,
            status: RemoteStatus::Processing,
            created_at: Utc::now(),
        })
    }

    async fn campaign_status(
        &self,
        external_id: &str,
    ) -> Result<CampaignStatusReport, AdServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled_ids.lock().push(external_id.to_string());
        let next = self.polls.lock().pop_front();
        let status = next.unwrap_or(Ok(RemoteStatus::Active))?;
        let serving_status = match status {
            RemoteStatus::Active => ServingStatus::Eligible,
            RemoteStatus::Processing => ServingStatus::PendingReview,
            RemoteStatus::Rejected => ServingStatus::NotServing,
        };
        Ok(CampaignStatusReport {
            external_id: external_id.to_string(),
            status,
            serving_status,
            last_updated: Utc::now(),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
