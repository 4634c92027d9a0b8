//! Advertising platform contract and a simulated implementation.
//!
//! The engine only talks to [`AdService`]; a production client replaces
//! [`SimulatedAdService`] behind the same trait.

use std::time::Duration;

use async_trait::async_trait;
use campaign_core::config::AdServiceConfig;
use campaign_core::AdServiceError;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::CampaignRecord;

/// Campaign payload sent to the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    pub budget: Decimal,
    pub keywords: Vec<String>,
}

impl From<&CampaignRecord> for CampaignSpec {
    fn from(record: &CampaignRecord) -> Self {
        Self {
            name: record.name.clone(),
            budget: record.budget,
            keywords: record.keywords.clone(),
        }
    }
}

/// Remote lifecycle status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Processing,
    Active,
    /// Refused during review. Terminal on the platform side.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Eligible,
    PendingReview,
    NotServing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCampaign {
    #[serde(rename = "campaignId")]
    pub external_id: String,
    pub status: RemoteStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusReport {
    #[serde(rename = "campaignId")]
    pub external_id: String,
    pub status: RemoteStatus,
    pub serving_status: ServingStatus,
    pub last_updated: DateTime<Utc>,
}

/// Operations the engine needs from the advertising platform.
#[async_trait]
pub trait AdService: Send + Sync {
    async fn create_campaign(&self, spec: &CampaignSpec) -> Result<CreatedCampaign, AdServiceError>;

    async fn campaign_status(&self, external_id: &str)
        -> Result<CampaignStatusReport, AdServiceError>;

    async fn health_check(&self) -> bool;
}

/// Probability that a successful status poll reports the campaign live.
const ACTIVE_PROBABILITY: f64 = 0.7;
/// Share of injected failures that are rate limits; the rest are server errors.
const RATE_LIMIT_SHARE: f64 = 0.6;

/// Simulated ad platform with injected latency and error rate.
pub struct SimulatedAdService {
    config: AdServiceConfig,
    rng: parking_lot::Mutex<StdRng>,
    issued_ids: DashSet<String>,
}

impl SimulatedAdService {
    pub fn new(config: AdServiceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            region = ?config.region,
            base_url = config.region.base_url(),
            client_id = %config.client_id,
            profile_id = %config.profile_id,
            error_rate = config.error_rate,
            "simulated ad service initialized"
        );
        Self {
            config,
            rng: parking_lot::Mutex::new(rng),
            issued_ids: DashSet::new(),
        }
    }

    pub fn error_rate(&self) -> f64 {
        self.config.error_rate
    }

    async fn simulate_latency(&self) {
        let (min, max) = (self.config.min_latency_ms, self.config.max_latency_ms);
        if max == 0 {
            return;
        }
        let delay_ms = self.rng.lock().gen_range(min..=max);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    /// Rolls the dice for an injected failure.
    fn injected_failure(&self) -> Option<AdServiceError> {
        let mut rng = self.rng.lock();
        if !rng.gen_bool(self.config.error_rate.clamp(0.0, 1.0)) {
            return None;
        }
        let error = if rng.gen_bool(RATE_LIMIT_SHARE) {
            AdServiceError::RateLimited("Rate limit exceeded. Retry after 60 seconds.".to_string())
        } else if rng.gen_bool(0.75) {
            AdServiceError::Server("AWS internal server error. Please try again.".to_string())
        } else {
            AdServiceError::Server("Service temporarily unavailable.".to_string())
        };
        warn!(error_code = error.error_code(), error = %error, "simulated ad service error");
        Some(error)
    }

    /// `AMZ-NNNNN`, unique for the lifetime of this instance.
    fn generate_external_id(&self) -> String {
        loop {
            let candidate = format!("AMZ-{}", self.rng.lock().gen_range(10_000..=99_999));
            if self.issued_ids.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[async_trait]
impl AdService for SimulatedAdService {
    async fn create_campaign(&self, spec: &CampaignSpec) -> Result<CreatedCampaign, AdServiceError> {
        debug!(
            name = %spec.name,
            budget = %spec.budget,
            keywords_count = spec.keywords.len(),
            "create campaign request"
        );

        self.simulate_latency().await;
        if let Some(error) = self.injected_failure() {
            return Err(error);
        }
        if spec.budget <= Decimal::ZERO {
            return Err(AdServiceError::Validation(
                "Budget must be positive.".to_string(),
            ));
        }
        if spec.keywords.is_empty() {
            return Err(AdServiceError::Validation(
                "At least one keyword is required.".to_string(),
            ));
        }

        let external_id = self.generate_external_id();
        info!(external_id = %external_id, name = %spec.name, "campaign created on ad platform");
        metrics::counter!("ads.campaigns_created").increment(1);

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
        debug!(external_id = %external_id, "campaign status request");

        self.simulate_latency().await;
        if let Some(error) = self.injected_failure() {
            return Err(error);
        }
        if external_id.trim().is_empty() {
            return Err(AdServiceError::Validation(
                "Campaign id is required.".to_string(),
            ));
        }

        // No remote state is kept; review delay is modelled as a coin flip.
        let active = self.rng.lock().gen_bool(ACTIVE_PROBABILITY);
        let (status, serving_status) = if active {
            (RemoteStatus::Active, ServingStatus::Eligible)
        } else {
            (RemoteStatus::Processing, ServingStatus::PendingReview)
        };

        debug!(external_id = %external_id, status = ?status, "campaign status retrieved");
        Ok(CampaignStatusReport {
            external_id: external_id.to_string(),
            status,
            serving_status,
            last_updated: Utc::now(),
        })
    }

    async fn health_check(&self) -> bool {
        self.simulate_latency().await;
        self.injected_failure().is_none()
    }
}
