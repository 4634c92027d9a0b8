//! Campaign record and its lifecycle state machine.

use std::collections::HashSet;
use std::fmt;

use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on failed sync passes a campaign may accumulate.
pub const MAX_RETRIES: u32 = 3;

const MAX_NAME_LEN: usize = 255;
const MAX_KEYWORD_LEN: usize = 100;
const MAX_BUDGET_DIGITS: u32 = 10;
const BUDGET_DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    /// Created locally, not yet provisioned on the ad platform.
    Pending,
    /// Provisioned remotely, awaiting platform confirmation.
    Processing,
    /// Live on the ad platform.
    Active,
    /// Sync failed; may be retried while under the retry cap.
    Failed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 4] = [
        CampaignStatus::Pending,
        CampaignStatus::Processing,
        CampaignStatus::Active,
        CampaignStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "PENDING",
            CampaignStatus::Processing => "PROCESSING",
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Failed => "FAILED",
        }
    }

    /// The full transition table. `Active` has no outgoing edges.
    pub fn can_transition_to(&self, to: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Active)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Active)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated input for a new campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub budget: Decimal,
    pub keywords: Vec<String>,
}

impl NewCampaign {
    pub fn new(name: impl Into<String>, budget: Decimal, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            budget,
            keywords,
        }
    }

    /// Accepts keywords as a single comma-separated string.
    pub fn with_keyword_list(name: impl Into<String>, budget: Decimal, keywords: &str) -> Self {
        let keywords = keywords
            .split(',')
            .map(str::trim)
            .filter(|kw| !kw.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(name, budget, keywords)
    }

    /// Normalizes the payload and rejects anything the platform would refuse.
    pub fn validate(self) -> CampaignResult<NewCampaign> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(CampaignError::Validation(
                "Campaign name cannot be empty.".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CampaignError::Validation(format!(
                "Campaign name must be at most {MAX_NAME_LEN} characters."
            )));
        }

        let budget = validate_budget(self.budget)?;
        let keywords = normalize_keywords(self.keywords)?;

        Ok(NewCampaign {
            name,
            budget,
            keywords,
        })
    }
}

fn validate_budget(budget: Decimal) -> CampaignResult<Decimal> {
    let budget = budget.normalize();
    if budget < Decimal::new(1, BUDGET_DECIMAL_PLACES) {
        return Err(CampaignError::Validation(
            "Budget must be at least 0.01.".to_string(),
        ));
    }
    if budget.scale() > BUDGET_DECIMAL_PLACES {
        return Err(CampaignError::Validation(format!(
            "Budget must have at most {BUDGET_DECIMAL_PLACES} decimal places."
        )));
    }
    let limit = Decimal::from(10u64.pow(MAX_BUDGET_DIGITS - BUDGET_DECIMAL_PLACES));
    if budget >= limit {
        return Err(CampaignError::Validation(format!(
            "Budget must have at most {MAX_BUDGET_DIGITS} digits."
        )));
    }
    let mut budget = budget;
    budget.rescale(BUDGET_DECIMAL_PLACES);
    Ok(budget)
}

/// Trims, drops duplicates case-insensitively and keeps first-seen order.
fn normalize_keywords(keywords: Vec<String>) -> CampaignResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CampaignError::Validation(
                "Keywords cannot be blank.".to_string(),
            ));
        }
        if keyword.chars().count() > MAX_KEYWORD_LEN {
            return Err(CampaignError::Validation(format!(
                "Keywords must be at most {MAX_KEYWORD_LEN} characters."
            )));
        }
        if seen.insert(keyword.to_lowercase()) {
            unique.push(keyword.to_string());
        }
    }
    if unique.is_empty() {
        return Err(CampaignError::Validation(
            "At least one keyword is required.".to_string(),
        ));
    }
    Ok(unique)
}

/// The unit of synchronization between the local store and the ad platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub name: String,
    pub budget: Decimal,
    pub keywords: Vec<String>,
    pub status: CampaignStatus,
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRecord {
    /// Creates a `Pending` record from a payload that has already been validated.
    pub fn new(campaign: NewCampaign) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: campaign.name,
            budget: campaign.budget,
            keywords: campaign.keywords,
            status: CampaignStatus::Pending,
            external_id: None,
            error_message: None,
            retry_count: 0,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_external_id(&self) -> bool {
        self.external_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn is_synced(&self) -> bool {
        self.status == CampaignStatus::Active && self.has_external_id()
    }

    pub fn can_retry(&self) -> bool {
        self.status == CampaignStatus::Failed && self.retry_count < MAX_RETRIES
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }

    fn transition(&mut self, to: CampaignStatus) -> CampaignResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(CampaignError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `Pending -> Processing`. An external id that was already assigned is
    /// kept; the platform never re-keys a campaign.
    pub fn mark_processing(&mut self, external_id: impl Into<String>) -> CampaignResult<()> {
        let external_id = external_id.into();
        if let Some(existing) = &self.external_id {
            if *existing != external_id {
                return Err(CampaignError::Validation(format!(
                    "campaign {} already carries external id {existing}",
                    self.id
                )));
            }
        }
        self.transition(CampaignStatus::Processing)?;
        self.external_id = Some(external_id);
        self.error_message = None;
        Ok(())
    }

    /// `Processing -> Active`. Stamps `synced_at` only the first time.
    pub fn mark_active(&mut self, now: DateTime<Utc>) -> CampaignResult<()> {
        if !self.has_external_id() {
            return Err(CampaignError::InvalidTransition {
                from: self.status.to_string(),
                to: CampaignStatus::Active.to_string(),
            });
        }
        self.transition(CampaignStatus::Active)?;
        self.synced_at.get_or_insert(now);
        self.error_message = None;
        Ok(())
    }

    /// `Pending | Processing -> Failed`, counting one failed pass.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> CampaignResult<()> {
        if self.retries_exhausted() {
            return Err(CampaignError::MaxRetriesExceeded {
                id: self.id,
                max_retries: MAX_RETRIES,
            });
        }
        self.transition(CampaignStatus::Failed)?;
        self.error_message = Some(reason.into());
        self.retry_count += 1;
        Ok(())
    }

    /// `Failed -> Pending` for an operator retry.
    pub fn reset_for_retry(&mut self) -> CampaignResult<()> {
        if self.status == CampaignStatus::Failed && self.retries_exhausted() {
            return Err(CampaignError::MaxRetriesExceeded {
                id: self.id,
                max_retries: MAX_RETRIES,
            });
        }
        if !self.can_retry() {
            return Err(CampaignError::NotRetryable {
                id: self.id,
                status: self.status.to_string(),
                retry_count: self.retry_count,
                max_retries: MAX_RETRIES,
            });
        }
        self.transition(CampaignStatus::Pending)?;
        self.error_message = None;
        Ok(())
    }

    /// Checks the record-level invariants. Used by tests after every transition.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.retry_count > MAX_RETRIES {
            return Err(format!("retry_count {} above cap", self.retry_count));
        }
        if self.status == CampaignStatus::Active
            && (!self.has_external_id() || self.synced_at.is_none())
        {
            return Err("active campaign without external id or synced_at".to_string());
        }
        if self.status == CampaignStatus::Processing && !self.has_external_id() {
            return Err("processing campaign without external id".to_string());
        }
        if self.error_message.is_some() && self.status != CampaignStatus::Failed {
            return Err(format!("error message present while {}", self.status));
        }
        Ok(())
    }
}
